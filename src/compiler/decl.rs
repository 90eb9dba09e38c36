//! Declaration and statement compilation
//!
//! A state machine over declaration kinds: classes allocate units and
//! synthesize their constructor/static-initializer pair, functions spawn
//! method frames, `let` compiles to fields or local slots, and control
//! statements consume the delayed-branch machinery.

use crate::classfile::code::{Const, Insn, Label};
use crate::classfile::opcodes as op;
use crate::parser::TokenKind;
use crate::program::{access, ExtensionKind, FieldDef, MethodDef, PropertyKind};

use super::types::{method_descriptor, JType};
use super::{Compiler, ExtensionTarget, Frame, Scope, MAGIC_PREFIX};

const MODIFIER_KINDS: [TokenKind; 8] = [
    TokenKind::Inline,
    TokenKind::Private,
    TokenKind::Public,
    TokenKind::Static,
    TokenKind::Final,
    TokenKind::Magic,
    TokenKind::Setter,
    TokenKind::Getter,
];

impl<'a> Compiler<'a> {
    pub(crate) fn has_modifier(&self, kind: TokenKind) -> bool {
        self.pending_modifiers.contains(&kind)
    }

    fn pending_access(&self) -> u16 {
        let mut flags = 0;
        for modifier in &self.pending_modifiers {
            flags |= match modifier {
                TokenKind::Public => access::ACC_PUBLIC,
                TokenKind::Private => access::ACC_PRIVATE,
                TokenKind::Static | TokenKind::Inline => access::ACC_STATIC,
                TokenKind::Final => access::ACC_FINAL,
                _ => 0,
            };
        }
        if flags & access::ACC_PRIVATE == 0 {
            flags |= access::ACC_PUBLIC;
        }
        flags
    }

    /// Collect modifier keywords for the next declaration and validate
    /// them against what that declaration can carry.
    pub(crate) fn modifier(&mut self) {
        let mut modifiers = Vec::new();
        while self.match_any(&MODIFIER_KINDS) {
            modifiers.push(self.parser.previous.kind);
        }

        match self.parser.current.kind {
            TokenKind::Fn => self.pending_modifiers.extend(modifiers),
            TokenKind::Let => {
                if modifiers.contains(&TokenKind::Getter) {
                    self.error("A variable can not be a getter!");
                    return;
                }
                if modifiers.contains(&TokenKind::Setter) {
                    self.error("A variable can not be a setter!");
                    return;
                }
                self.pending_modifiers.extend(modifiers);
            }
            TokenKind::Class => {
                for (kind, what) in [
                    (TokenKind::Getter, "a getter"),
                    (TokenKind::Setter, "a setter"),
                    (TokenKind::Magic, "magic"),
                    (TokenKind::Inline, "inline"),
                ] {
                    if modifiers.contains(&kind) {
                        let message = format!("A class can not be {}!", what);
                        self.error(&message);
                        return;
                    }
                }
                self.pending_modifiers.extend(modifiers);
            }
            _ => {
                if !modifiers.is_empty() {
                    self.error_at_current("Element does not support modifiers!");
                }
            }
        }
    }

    // ----- top level -------------------------------------------------------

    pub(crate) fn declaration(&mut self) {
        self.modifier();

        if self.match_kind(TokenKind::Class) {
            self.class_declaration(false);
        } else if self.match_kind(TokenKind::Fn) {
            self.fn_declaration();
        } else if self.match_kind(TokenKind::Let) {
            self.var_declaration(false);
        } else if self.match_kind(TokenKind::RightBrace) {
            self.error("Closing file too soon");
        } else {
            self.statement(true);
        }

        if self.parser.panic_mode {
            self.synchronize();
        }
        self.clear_stack();
    }

    /// Skip tokens until a statement terminator or a declaration-starting
    /// keyword so one bad construct yields one diagnostic.
    pub(crate) fn synchronize(&mut self) {
        self.parser.panic_mode = false;

        while self.parser.current.kind != TokenKind::Eof {
            if self.parser.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.parser.current.kind {
                TokenKind::Class
                | TokenKind::Fn
                | TokenKind::Let
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ----- classes ---------------------------------------------------------

    pub(crate) fn class_declaration(&mut self, nested: bool) {
        self.consume(TokenKind::Identifier, "Expect class name");
        let simple = self.parser.previous.lexeme.clone();

        let package_path = self.file_package.replace('.', "/");
        let prefix = if package_path.is_empty() {
            String::new()
        } else {
            format!("{}/", package_path)
        };
        let class_name = if nested {
            format!("{}{}${}", prefix, self.current_unit().simple_name(), simple)
        } else {
            format!("{}{}", prefix, simple)
        };

        let mut super_name = "java/lang/Object".to_string();
        if self.match_kind(TokenKind::Colon) {
            if let Some(ty) = self.parse_type("Expect superclass name") {
                super_name = ty.internal_name();
            }
        }

        self.consume(TokenKind::LeftBrace, "Expected \"{\" before class body");

        let mut unit = self.new_class_unit(&class_name);
        unit.access = self.pending_access() | access::ACC_SUPER;
        if super_name != unit.super_name {
            // retarget the synthesized constructor's super call
            unit.super_name = super_name.clone();
            if let Some(Insn::Method { owner, .. }) = unit.methods[0].code.get_mut(1) {
                *owner = super_name.clone();
            }
        }
        unit.annotations = std::mem::take(&mut self.pending_annotations);
        self.pending_modifiers.clear();

        if nested {
            let outer = self.frame().class.clone();
            unit.outer = Some(outer.clone());
            if let Some(parent) = self.program.unit_mut(&outer) {
                parent.nested.push(class_name.clone());
            }
        }

        self.imports.insert(simple, class_name.clone());
        self.program.declare(unit);

        let scope = if nested { Scope::NestedClass } else { Scope::Class };
        self.push_frame(Frame::new(scope, class_name.clone(), 1));

        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.modifier();
            if self.match_kind(TokenKind::Fn) {
                self.fn_declaration();
            } else if self.match_kind(TokenKind::Let) {
                self.var_declaration(false);
            } else if self.match_kind(TokenKind::Class) {
                self.class_declaration(true);
            } else if self.match_kind(TokenKind::At) {
                self.annotation();
            } else {
                self.error_at_current("Expect class member declaration");
                self.advance();
            }
            if self.parser.panic_mode {
                self.synchronize();
            }
            self.clear_stack();
        }

        self.consume(TokenKind::RightBrace, "Expected \"}\" after class body");
        self.append_returns(&class_name);
        self.pop_frame();
    }

    // ----- functions --------------------------------------------------------

    pub(crate) fn fn_declaration(&mut self) {
        if !self.frame().scope.is_class_like() {
            self.error_at_current("Methods can only be inside of classes!");
            return;
        }
        let class_name = self.frame().class.clone();
        let at_top_level = self.frame().scope == Scope::Top;

        let magic = self.has_modifier(TokenKind::Magic);
        let inline = self.has_modifier(TokenKind::Inline);
        // top-level functions belong to the file unit and dispatch statically
        let mut is_static =
            at_top_level || self.has_modifier(TokenKind::Static) || inline;

        let mut extension: Option<(ExtensionKind, JType)> = None;
        let name: String;

        if magic {
            name = format!(
                "{}{}",
                MAGIC_PREFIX,
                self.parse_identifier("Expected name of magic method!")
            );
        } else if !self.check(TokenKind::Identifier) {
            name = "<init>".to_string();
        } else {
            let first = self.parse_identifier("Expect function name");
            let mut dotted = first.clone();
            let mut qualified = false;
            while self.match_kind(TokenKind::Dot) {
                qualified = true;
                dotted.push('.');
                dotted.push_str(&self.parse_identifier("Expect name after \".\""));
            }
            let generics = self.parse_generic_args();

            if self.match_kind(TokenKind::Colon) {
                // extension method: fn Type:name(...)
                let base = if qualified {
                    JType::from_class_name(&dotted)
                } else {
                    JType::from_class_name(&self.resolve_class_name(&dotted))
                };
                let kind = if self.has_modifier(TokenKind::Static) {
                    ExtensionKind::Class
                } else {
                    ExtensionKind::Instance
                };
                extension = Some((kind, base.with_args(generics)));
                name = self.parse_identifier("Expected extending method name!");
                is_static = true;
            } else {
                if qualified || !generics.is_empty() {
                    self.error("Invalid method name!");
                    return;
                }
                name = first;
            }
        }

        if self.has_modifier(TokenKind::Getter) && self.has_modifier(TokenKind::Setter) {
            self.error("A method can not be both a getter and a setter!");
            return;
        }

        let constructor = name == "<init>";
        self.consume(TokenKind::LeftParen, "Expected \"(\" after function name!");

        let start = self.new_label();
        let is_instance_extension =
            matches!(extension, Some((ExtensionKind::Instance, _)));

        self.push_frame(Frame::new(Scope::Method, class_name.clone(), 0));

        let mut parameters: Vec<JType> = Vec::new();
        if !is_static || is_instance_extension {
            let this_ty = match &extension {
                Some((ExtensionKind::Instance, base)) => base.clone(),
                _ => JType::object(class_name.clone()),
            };
            if is_instance_extension {
                parameters.push(this_ty.clone());
            }
            self.alloc_local("this", this_ty, start);
        }

        if !self.check(TokenKind::RightParen) {
            loop {
                let param_name = self.parse_identifier("Expected parameter name");
                let Some(ty) = self.consume_type("Expected type after parameter name") else {
                    break;
                };
                let ty = ty.with_nullable(self.match_kind(TokenKind::Question));
                parameters.push(ty.clone());
                self.alloc_local(&param_name, ty, start);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        if self.has_modifier(TokenKind::Setter) && parameters.len() != 1 {
            self.error("Setter methods take exactly one parameter!");
            self.pop_frame();
            return;
        }

        self.consume(TokenKind::RightParen, "Expected \")\" after parameters!");

        let mut return_type = JType::Void;
        if !constructor && self.check(TokenKind::Colon) {
            if let Some(ty) = self.consume_type("Expected return type after \":\"!") {
                return_type = ty.with_nullable(self.match_kind(TokenKind::Question));
            }
        }
        if self.has_modifier(TokenKind::Setter) && return_type != JType::Void {
            self.error("Setter methods can not declare a return type!");
            self.pop_frame();
            return;
        }

        let descriptor = method_descriptor(&parameters, &return_type);
        let mut method_access = self.pending_access();
        if is_static {
            method_access |= access::ACC_STATIC;
        }

        let mut def = MethodDef::new(method_access, name.clone(), descriptor.clone());
        def.markers.inline = inline;
        if self.has_modifier(TokenKind::Getter) {
            def.markers.property = Some((PropertyKind::Get, return_type.descriptor()));
        } else if self.has_modifier(TokenKind::Setter) {
            def.markers.property =
                Some((PropertyKind::Set, parameters[0].descriptor()));
        }
        if let Some((kind, base)) = &extension {
            def.markers.extension = Some((*kind, base.internal_name()));
            let target = ExtensionTarget {
                owner: class_name.clone(),
                name: name.clone(),
                descriptor: descriptor.clone(),
            };
            match kind {
                ExtensionKind::Class => self
                    .static_extensions
                    .entry(base.internal_name())
                    .or_default()
                    .push(target),
                ExtensionKind::Instance => self
                    .extensions
                    .entry(base.internal_name())
                    .or_default()
                    .push(target),
            }
        }
        def.annotations = std::mem::take(&mut self.pending_annotations);
        self.pending_modifiers.clear();

        // register the method and point the frame's emission at it
        let method_index = {
            let unit = self
                .program
                .unit_mut(&class_name)
                .expect("current unit missing from program table");
            if constructor {
                if descriptor == "()V" {
                    unit.methods[0].access = method_access;
                    unit.methods[0].annotations = def.annotations;
                } else {
                    // keep the synthesized super call and field initializers
                    def.code = std::mem::take(&mut unit.methods[0].code);
                    unit.methods[0] = def;
                }
                0
            } else {
                unit.methods.push(def);
                unit.methods.len() - 1
            }
        };
        {
            let frame = self.frame_mut();
            frame.method = method_index;
            frame.fn_name = Some(name.clone());
            frame.return_type = Some(return_type.clone());
        }

        self.mark(start);

        if self.match_kind(TokenKind::LeftBrace) {
            while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
                self.declaration_in_method();
            }
            self.consume(TokenKind::RightBrace, "Expected \"}\" after method body");
        } else if !self.match_kind(TokenKind::Semicolon) {
            self.declaration_in_method();
        }

        let end = self.new_label();
        self.mark(end);
        if return_type == JType::Void && !constructor {
            self.emit(Insn::Simple(op::RETURN));
        }

        self.finish_method(end);
    }

    pub(crate) fn nested_fn_declaration(&mut self, parent: &str) {
        let name = self.parse_identifier("Expect function name");
        let jvm_name = format!("{}#{}", parent, name);
        let class_name = self.frame().class.clone();

        if self.has_modifier(TokenKind::Magic) {
            self.error("Nested methods can not be magic!");
            return;
        }
        if self.has_modifier(TokenKind::Inline) {
            self.error("Nested methods can not be inline!");
            return;
        }

        self.consume(TokenKind::LeftParen, "Expect \"(\" after function name");

        let is_static =
            self.has_modifier(TokenKind::Static) || self.current_method_is_static();
        let start = self.new_label();

        self.push_frame(Frame::new(Scope::NestedMethod, class_name.clone(), 0));

        if !is_static {
            self.alloc_local("this", JType::object(class_name.clone()), start);
        }

        let mut parameters = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let param_name = self.parse_identifier("Expected parameter name");
                let Some(ty) = self.consume_type("Expected type after parameter name") else {
                    break;
                };
                let ty = ty.with_nullable(self.match_kind(TokenKind::Question));
                parameters.push(ty.clone());
                self.alloc_local(&param_name, ty, start);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect \")\" after parameters");

        let mut return_type = JType::Void;
        if let Some(ty) = self.consume_type("Expect return type after \":\"") {
            return_type = ty.with_nullable(self.match_kind(TokenKind::Question));
        }

        let mut method_access = self.pending_access();
        if is_static {
            method_access |= access::ACC_STATIC;
        }
        let mut def = MethodDef::new(
            method_access,
            jvm_name.clone(),
            method_descriptor(&parameters, &return_type),
        );
        def.annotations = std::mem::take(&mut self.pending_annotations);
        self.pending_modifiers.clear();

        let method_index = {
            let unit = self
                .program
                .unit_mut(&class_name)
                .expect("current unit missing from program table");
            unit.methods.push(def);
            unit.methods.len() - 1
        };
        {
            let frame = self.frame_mut();
            frame.method = method_index;
            frame.fn_name = Some(jvm_name.clone());
            frame.return_type = Some(return_type.clone());
        }

        self.mark(start);

        if self.match_kind(TokenKind::LeftBrace) {
            while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
                self.declaration_in_method();
            }
            self.consume(TokenKind::RightBrace, "Expected \"}\" after method body");
        } else if !self.match_kind(TokenKind::Semicolon) {
            self.declaration_in_method();
        }

        let end = self.new_label();
        self.mark(end);
        if return_type == JType::Void {
            self.emit(Insn::Simple(op::RETURN));
        }

        self.finish_method(end);

        // later bare-name calls dispatch to the mangled method
        self.method_renames.insert(name, jvm_name);
    }

    /// Record local-variable debug ranges, finalize max_locals, pop frame
    fn finish_method(&mut self, end: Label) {
        let frame = self.pop_frame();
        let unit = self
            .program
            .unit_mut(&frame.class)
            .expect("current unit missing from program table");
        let method = &mut unit.methods[frame.method];
        method.max_locals = method.max_locals.max(frame.max_locals);
        if !self.config.emit_locals {
            return;
        }
        for (name, local) in &frame.locals {
            method.local_vars.push(crate::program::LocalVarEntry {
                name: name.clone(),
                descriptor: local.ty.descriptor(),
                signature: local.ty.signature(),
                start: local.start,
                end,
                slot: local.index,
            });
        }
    }

    pub(crate) fn declaration_in_method(&mut self) {
        self.modifier();

        if self.match_kind(TokenKind::Fn) {
            let parent = self
                .frame()
                .fn_name
                .clone()
                .unwrap_or_else(|| "fn".to_string());
            self.nested_fn_declaration(&parent);
        } else if self.match_kind(TokenKind::Let) {
            self.var_declaration(false);
        } else if self.match_kind(TokenKind::At) {
            self.annotation();
        } else {
            self.statement(true);
        }

        if self.parser.panic_mode {
            self.synchronize();
        }
        self.clear_stack();
    }

    // ----- let -------------------------------------------------------------

    pub(crate) fn var_declaration(&mut self, require_semicolon: bool) {
        self.clear_stack();

        let start = self.new_label();
        if self.in_method_scope() {
            self.mark(start);
        }

        let class_scope = self.frame().scope.is_class_like();
        let inline = self.has_modifier(TokenKind::Inline);
        // top-level lets are file-scope globals
        let is_field_static = self.frame().scope == Scope::Top
            || self.has_modifier(TokenKind::Static)
            || inline;

        let mut names: Vec<String> = Vec::new();
        let mut name = String::new();
        if self.match_kind(TokenKind::LeftParen) {
            loop {
                names.push(self.parse_identifier("Expected identifier after \"(\"!"));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RightParen, "Expected \")\" after identifiers!");
        } else {
            name = self.parse_identifier("Expect variable name.");
        }
        let unpacking = !names.is_empty();

        let inference = !self.match_kind(TokenKind::Colon);
        let mut declared: Option<JType> = None;
        let mut nullable = false;
        if !unpacking {
            if !inference {
                let Some(ty) = self.parse_type("Expected type name after \":\".") else {
                    return;
                };
                nullable = self.match_kind(TokenKind::Question);
                declared = Some(ty.with_nullable(nullable));
            } else if !self.check(TokenKind::Equal) {
                self.error("Expected \"=\", can not infer type");
                return;
            }
        }

        let saved_method = self.frame().method;
        let set_value = self.match_kind(TokenKind::Equal);
        if set_value {
            if class_scope {
                // initializers compile into <init> / <clinit>
                self.frame_mut().method = if is_field_static { 1 } else { 0 };
                if !is_field_static {
                    let owner = self.frame().class.clone();
                    self.emit(Insn::Var { op: op::ALOAD, index: 0 });
                    self.push_type(JType::object(owner));
                }
            }

            self.expression();
            self.flush_delayed();

            if !nullable && self.peek_top().map_or(false, |t| t.nullable()) {
                self.error("Nullable value assigned to non-null variable!");
                self.frame_mut().method = saved_method;
                return;
            }
            if !unpacking {
                match &declared {
                    Some(ty) => {
                        if !self.peek_top().map_or(false, |t| t.nullable()) {
                            self.convert_top_for(ty);
                        }
                    }
                    None => declared = self.peek_top().cloned(),
                }
            }
        } else if unpacking {
            self.error("Expected \"=\" after \")\"");
            return;
        }

        if class_scope {
            if unpacking {
                self.error("Can't unpack into fields");
                self.frame_mut().method = saved_method;
                return;
            }
            let Some(ty) = declared.clone() else {
                self.error("Expected \"=\", can not infer type");
                self.frame_mut().method = saved_method;
                return;
            };
            let mut field_access = self.pending_access();
            if is_field_static {
                field_access |= access::ACC_STATIC;
            }
            let owner = self.frame().class.clone();
            let field = FieldDef {
                access: field_access,
                name: name.clone(),
                descriptor: ty.descriptor(),
                signature: ty.signature(),
                nullable,
                inline,
                annotations: std::mem::take(&mut self.pending_annotations),
            };
            if let Some(unit) = self.program.unit_mut(&owner) {
                unit.fields.push(field);
            }
            if set_value {
                let opcode = if is_field_static { op::PUTSTATIC } else { op::PUTFIELD };
                self.emit(Insn::Field {
                    op: opcode,
                    owner,
                    name,
                    desc: ty.descriptor(),
                });
                self.pop_type();
                if !is_field_static {
                    self.pop_type();
                }
            }
            self.pending_modifiers.clear();
        } else if self.in_method_scope() {
            if !self.pending_modifiers.is_empty() {
                self.error_at_current("A variable can not have modifiers!");
                return;
            }
            if unpacking {
                let Some(source) = self.peek_top().cloned() else { return };
                for (index, binding) in names.iter().enumerate() {
                    self.unpack(start, binding, index as i32, &source);
                }
                self.emit(Insn::Simple(op::POP));
                self.pop_type();
            } else {
                let Some(ty) = declared else { return };
                let index = self.alloc_local(&name, ty.clone(), start);
                if set_value {
                    self.emit(Insn::Var { op: ty.store_op(), index });
                    self.pop_type();
                }
            }
        }

        self.frame_mut().method = saved_method;

        if require_semicolon {
            self.consume(TokenKind::Semicolon, "Expect \";\" after variable declaration");
        } else {
            self.match_kind(TokenKind::Semicolon);
        }
    }

    /// One binding of a destructuring `let (a, b) = value`
    fn unpack(&mut self, start: Label, binding: &str, index: i32, source: &JType) {
        self.emit(Insn::Simple(op::DUP));
        self.push_type(source.clone());

        match source {
            JType::Array { elem, .. } => {
                self.emit_const(Const::Int(index));
                self.emit(Insn::Simple(elem.array_load_op()));
                self.pop_type();
                self.replace_top(elem.as_ref().clone());
            }
            JType::Object { name, .. } => {
                let owner = name.clone();
                if let Some((desc, is_static, _)) = self.find_field(&owner, binding) {
                    if is_static {
                        self.error("Can't unpack a static field");
                        return;
                    }
                    let ty = JType::from_descriptor(&desc).unwrap_or(JType::any_object());
                    self.emit(Insn::Field {
                        op: op::GETFIELD,
                        owner,
                        name: binding.to_string(),
                        desc,
                    });
                    self.replace_top(ty);
                } else if let Some((mdesc, pdesc, _)) =
                    self.find_property(&owner, binding, PropertyKind::Get, false)
                {
                    self.emit(Insn::Method {
                        op: op::INVOKEVIRTUAL,
                        owner,
                        name: binding.to_string(),
                        desc: mdesc,
                        itf: false,
                    });
                    self.replace_top(
                        JType::from_descriptor(&pdesc).unwrap_or(JType::any_object()),
                    );
                } else {
                    let message = format!("Couldn't find field \"{}\"!", binding);
                    self.error(&message);
                    return;
                }
            }
            _ => {
                self.error("Can't unpack primitives!");
                return;
            }
        }

        let Some(ty) = self.peek_top().cloned() else { return };
        let slot = self.alloc_local(binding, ty.clone(), start);
        self.emit(Insn::Var { op: ty.store_op(), index: slot });
        self.pop_type();
    }

    // ----- statements -------------------------------------------------------

    pub(crate) fn statement(&mut self, clear: bool) {
        if self.match_kind(TokenKind::Return) {
            self.return_statement();
        } else if self.match_kind(TokenKind::LeftBrace) {
            self.block();
        } else if self.match_kind(TokenKind::While) {
            self.while_statement();
        } else if self.match_kind(TokenKind::If) {
            self.if_statement();
        } else if self.match_kind(TokenKind::For) {
            self.for_statement();
        } else {
            self.expression_statement(clear, false);
        }
    }

    pub(crate) fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration_in_method();
        }
        self.consume(TokenKind::RightBrace, "Expect \"}\" after block");
    }

    fn block_or_statement(&mut self) {
        if self.match_kind(TokenKind::LeftBrace) {
            self.block();
        } else {
            self.declaration_in_method();
        }
    }

    fn return_statement(&mut self) {
        if !self.in_method_scope() {
            self.error("Can't return from code that are not in methods!");
            return;
        }

        if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RightBrace)
            || self.check(TokenKind::Eof)
        {
            self.match_kind(TokenKind::Semicolon);
            self.emit(Insn::Simple(op::RETURN));
            return;
        }

        self.expression();
        self.flush_delayed();

        let return_type = self
            .frame()
            .return_type
            .clone()
            .unwrap_or(JType::Void);
        let nullable = self.peek_top().map_or(false, |t| t.nullable());
        if nullable && !return_type.nullable() {
            self.error("Tried to return nullable value while the return value can not be null!");
            return;
        }

        if !return_type.is_string() {
            self.convert_top_for(&return_type);
        }
        self.emit(Insn::Simple(return_type.return_op()));
        if return_type != JType::Void {
            self.pop_type();
        }

        self.match_kind(TokenKind::Semicolon);
    }

    fn condition_is_boolean(&mut self) -> bool {
        if self.has_delayed() || matches!(self.peek_top(), Some(JType::Boolean)) {
            return true;
        }
        self.error("Last stack is not a boolean!");
        false
    }

    fn if_statement(&mut self) {
        self.expression();
        if !self.condition_is_boolean() {
            return;
        }

        let label_else = self.new_label();
        let label_end = self.new_label();

        self.emit_if_eq(label_else);
        self.block_or_statement();
        self.emit(Insn::Jump { op: op::GOTO, target: label_end });
        self.mark(label_else);

        if self.match_kind(TokenKind::Else) {
            self.block_or_statement();
        }
        self.mark(label_end);
    }

    fn while_statement(&mut self) {
        let label_start = self.new_label();
        let label_end = self.new_label();

        self.mark(label_start);
        self.expression();
        if !self.condition_is_boolean() {
            return;
        }

        self.emit_if_eq(label_end);
        self.block_or_statement();
        self.emit(Insn::Jump { op: op::GOTO, target: label_start });
        self.mark(label_end);
    }

    fn for_statement(&mut self) {
        if self.match_kind(TokenKind::Identifier) {
            self.foreach_statement();
            return;
        }

        if self.match_kind(TokenKind::Let) {
            self.var_declaration(true);
        } else {
            self.consume(TokenKind::Semicolon, "Expected \";\"");
        }

        let label_start = self.new_label();
        let label_end = self.new_label();
        self.mark(label_start);

        self.expression();
        if !self.condition_is_boolean() {
            return;
        }
        self.emit_if_eq(label_end);
        self.consume(TokenKind::Semicolon, "Expect \";\"");

        // the increment runs after the body; capture it now, replay later
        let depth_before = self.stack_depth();
        self.begin_capture();
        self.expression();
        self.flush_delayed();
        while self.stack_depth() > depth_before {
            let wide = self.peek_top().map_or(false, |t| t.is_wide());
            self.raw_emit(Insn::Simple(if wide { op::POP2 } else { op::POP }));
            self.pop_type();
        }
        let increment = self.end_capture();

        self.block_or_statement();

        self.emit_many(increment);
        self.emit(Insn::Jump { op: op::GOTO, target: label_start });
        self.mark(label_end);
    }

    /// `for x in iterable { ... }` over a value whose static type
    /// implements Iterable; the element type comes from the declared
    /// generic argument, Object otherwise.
    fn foreach_statement(&mut self) {
        let identifier = self.parser.previous.lexeme.clone();
        let start = self.new_label();
        self.mark(start);

        self.consume(TokenKind::In, "Expected \"in\" after variable declaration!");

        self.expression();
        self.flush_delayed();

        let Some(iterable) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if !iterable.is_pure_object()
            || !self.is_subtype(&iterable.internal_name(), "java/lang/Iterable")
        {
            self.error("Last stack isn't an iterator!");
            return;
        }

        let elem = iterable
            .type_args()
            .first()
            .cloned()
            .unwrap_or_else(JType::any_object);

        let slot = self.alloc_local(&identifier, elem.clone(), start);
        let iterator_slot = self.alloc_hidden_slot(1);

        self.emit(Insn::Method {
            op: op::INVOKEINTERFACE,
            owner: "java/lang/Iterable".to_string(),
            name: "iterator".to_string(),
            desc: "()Ljava/util/Iterator;".to_string(),
            itf: true,
        });
        self.replace_top(JType::object("java/util/Iterator"));
        self.emit(Insn::Var { op: op::ASTORE, index: iterator_slot });
        self.pop_type();

        let label_loop = self.new_label();
        let label_done = self.new_label();
        self.mark(label_loop);

        self.emit(Insn::Var { op: op::ALOAD, index: iterator_slot });
        self.push_type(JType::object("java/util/Iterator"));
        self.emit(Insn::Method {
            op: op::INVOKEINTERFACE,
            owner: "java/util/Iterator".to_string(),
            name: "hasNext".to_string(),
            desc: "()Z".to_string(),
            itf: true,
        });
        self.replace_top(JType::Boolean);
        self.emit(Insn::Jump { op: op::IFEQ, target: label_done });
        self.pop_type();

        self.emit(Insn::Var { op: op::ALOAD, index: iterator_slot });
        self.push_type(JType::object("java/util/Iterator"));
        self.emit(Insn::Method {
            op: op::INVOKEINTERFACE,
            owner: "java/util/Iterator".to_string(),
            name: "next".to_string(),
            desc: "()Ljava/lang/Object;".to_string(),
            itf: true,
        });
        self.replace_top(JType::any_object());

        if elem.is_pure_object() && elem.internal_name() != "java/lang/Object" {
            self.emit(Insn::Type { op: op::CHECKCAST, name: elem.internal_name() });
            self.replace_top(elem.clone());
        } else {
            self.convert_top_for(&elem);
        }
        self.emit(Insn::Var { op: elem.store_op(), index: slot });
        self.pop_type();

        self.block_or_statement();

        self.emit(Insn::Jump { op: op::GOTO, target: label_loop });
        self.mark(label_done);
    }
}
