//! The compilation context
//!
//! Drives parsing and, in the same pass, bytecode emission into the
//! program table. There is no AST: prefix/infix parse actions emit
//! instructions immediately while a shadow operand-type stack mirrors the
//! virtual machine's runtime value stack, driving implicit conversions,
//! operator resolution and overload lookup.

pub mod delayed;
pub mod rules;
pub mod types;

mod decl;
mod expr;

use std::collections::HashMap;

use crate::classfile::code::{Const, Insn, Label};
use crate::classfile::opcodes as op;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::{ParserState, Scanner, Token, TokenKind};
use crate::program::{access, MethodDef, ProgramTable, Unit};
use crate::universe::{builtins, TypeUniverse};

use delayed::DelayedInstruction;
use rules::Precedence;
use types::{parse_method_descriptor, JType};

/// Name prefix for operator ("magic") methods
pub const MAGIC_PREFIX: &str = "magic^";

/// Which scope kind a frame compiles in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Top,
    Class,
    NestedClass,
    Method,
    NestedMethod,
}

impl Scope {
    fn is_method(self) -> bool {
        matches!(self, Scope::Method | Scope::NestedMethod)
    }

    fn is_class_like(self) -> bool {
        matches!(self, Scope::Top | Scope::Class | Scope::NestedClass)
    }
}

/// A declared local variable
#[derive(Debug, Clone)]
pub struct Local {
    pub ty: JType,
    pub index: u16,
    pub start: Label,
}

/// A call whose target is known before its arguments are parsed.
///
/// Nesting depth is bounded by the parser's own recursion, so a single
/// slot per frame is sufficient.
#[derive(Debug, Clone)]
pub enum PendingCall {
    /// Unqualified call, resolved against the enclosing unit
    Auto { owner: String, name: String },
    /// Static member call through a class literal
    Static { owner: String, name: String },
    /// Instance call with the receiver already on the stack
    Virtual { owner: String, name: String },
    /// Extension method: receiver on the stack becomes the first argument
    Extension {
        owner: String,
        name: String,
        descriptor: String,
    },
}

/// One compilation scope: locals, shadow stacks and emission target
#[derive(Debug)]
pub struct Frame {
    pub scope: Scope,
    /// Unit receiving emitted members/instructions
    pub class: String,
    /// Index into the unit's method table instructions go to
    pub method: usize,
    pub fn_name: Option<String>,
    pub return_type: Option<JType>,
    locals: Vec<(String, Local)>,
    pub max_locals: u16,
    stack: Vec<JType>,
    delayed: Option<DelayedInstruction>,
    pending_call: Option<PendingCall>,
    /// Class-literal slot for static member access, consumed by the next dot
    pending_class: Option<JType>,
}

impl Frame {
    fn new(scope: Scope, class: String, method: usize) -> Self {
        Self {
            scope,
            class,
            method,
            fn_name: None,
            return_type: None,
            locals: Vec::new(),
            max_locals: 0,
            stack: Vec::new(),
            delayed: None,
            pending_call: None,
            pending_class: None,
        }
    }
}

/// An imported static member marked for direct static dispatch
#[derive(Debug, Clone)]
pub struct InlineMethod {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct InlineField {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// An extension method registered for a receiver type
#[derive(Debug, Clone)]
pub struct ExtensionTarget {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// A callable resolved through the program table or the type universe
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub is_interface: bool,
}

/// The compiler for one source file
pub struct Compiler<'a> {
    config: Config,
    scanner: Scanner<'a>,
    pub(crate) parser: ParserState,
    universe: &'a dyn TypeUniverse,
    pub(crate) program: &'a mut ProgramTable,

    file_name: String,
    file_package: String,
    /// Internal name of the implicit file unit
    file_unit: String,

    // Per-file symbol tables, shared by every nested scope
    imports: HashMap<String, String>,
    inline_methods: Vec<InlineMethod>,
    inline_fields: Vec<InlineField>,
    extensions: HashMap<String, Vec<ExtensionTarget>>,
    static_extensions: HashMap<String, Vec<ExtensionTarget>>,
    method_renames: HashMap<String, String>,

    pending_modifiers: Vec<TokenKind>,
    pending_annotations: Vec<crate::program::AnnotationDef>,

    frames: Vec<Frame>,
    /// Redirection buffers for instruction capture
    captures: Vec<Vec<Insn>>,
    next_label: Label,
}

impl<'a> Compiler<'a> {
    pub fn new(
        source: &'a str,
        file_package: &str,
        file_stem: &str,
        config: Config,
        universe: &'a dyn TypeUniverse,
        program: &'a mut ProgramTable,
    ) -> Self {
        let package_path = file_package.replace('.', "/");
        let file_unit = if package_path.is_empty() {
            file_stem.to_string()
        } else {
            format!("{}/{}", package_path, file_stem)
        };

        let mut compiler = Self {
            config,
            scanner: Scanner::new(source),
            parser: ParserState::new(),
            universe,
            program,
            file_name: format!("{}.bas", file_stem),
            file_package: file_package.to_string(),
            file_unit: file_unit.clone(),
            imports: HashMap::new(),
            inline_methods: Vec::new(),
            inline_fields: Vec::new(),
            extensions: HashMap::new(),
            static_extensions: HashMap::new(),
            method_renames: HashMap::new(),
            pending_modifiers: Vec::new(),
            pending_annotations: Vec::new(),
            frames: Vec::new(),
            captures: Vec::new(),
            next_label: 0,
        };

        let implicit = compiler.new_class_unit(&file_unit);
        compiler.program.declare(implicit);
        // top-level statements compile into the implicit unit's <clinit>
        compiler.frames.push(Frame::new(Scope::Top, file_unit, 1));

        // the standard library is visible in every unit
        compiler.import_members(builtins::STD_CLASS);
        compiler
            .imports
            .insert("Std".to_string(), builtins::STD_CLASS.to_string());

        compiler
    }

    /// A fresh unit with its synthesized constructor and static initializer
    fn new_class_unit(&self, name: &str) -> Unit {
        let mut unit = Unit::new(name, access::ACC_PUBLIC | access::ACC_SUPER);
        let mut init = MethodDef::new(access::ACC_PUBLIC, "<init>", "()V");
        init.max_locals = 1;
        init.code = vec![
            Insn::Var { op: op::ALOAD, index: 0 },
            Insn::Method {
                op: op::INVOKESPECIAL,
                owner: unit.super_name.clone(),
                name: "<init>".to_string(),
                desc: "()V".to_string(),
                itf: false,
            },
        ];
        unit.methods.push(init);
        unit.methods
            .push(MethodDef::new(access::ACC_STATIC, "<clinit>", "()V"));
        unit
    }

    /// Run the compilation to completion and hand back the implicit unit name
    pub fn compile(mut self) -> Result<String> {
        self.advance();
        while !self.match_kind(TokenKind::Eof) {
            self.declaration();
        }

        // close the implicit unit's synthesized bodies
        let file_unit = self.file_unit.clone();
        self.append_returns(&file_unit);

        if self.parser.had_error {
            Err(Error::semantic_error(format!(
                "compilation of {} failed",
                self.file_name
            )))
        } else {
            Ok(self.file_unit)
        }
    }

    pub(crate) fn append_returns(&mut self, unit_name: &str) {
        if let Some(unit) = self.program.unit_mut(unit_name) {
            for method in unit.methods.iter_mut() {
                if method.name == "<init>" || method.name == "<clinit>" {
                    method.code.push(Insn::Simple(op::RETURN));
                }
            }
        }
    }

    // ----- error reporting ------------------------------------------------

    fn report(&mut self, token: Token, message: &str) {
        if self.parser.panic_mode {
            return;
        }
        self.parser.panic_mode = true;

        eprint!("[file {}] [line {}] Error", self.file_name, token.line);
        match token.kind {
            TokenKind::Eof => eprint!(" at end"),
            TokenKind::Error => {}
            _ => eprint!(" at \"{}\"", token.lexeme),
        }
        eprintln!(" -> {}", message);
        self.parser.had_error = true;
    }

    pub(crate) fn error(&mut self, message: &str) {
        let token = self.parser.before_previous.clone();
        self.report(token, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        let token = self.parser.current.clone();
        self.report(token, message);
    }

    // ----- token plumbing -------------------------------------------------

    pub(crate) fn advance(&mut self) {
        self.parser.before_previous = std::mem::replace(
            &mut self.parser.previous,
            self.parser.current.clone(),
        );

        loop {
            self.parser.current = self.scanner.next_token();
            if self.config.debug {
                eprintln!("token {:?} \"{}\"", self.parser.current.kind, self.parser.current.lexeme);
            }
            if self.parser.current.kind != TokenKind::Error {
                break;
            }
            let message = self.parser.current.lexeme.clone();
            self.error_at_current(&message);
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.parser.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.parser.current.kind == kind
    }

    pub(crate) fn match_kind(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    pub(crate) fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.match_kind(*kind) {
                return true;
            }
        }
        false
    }

    // ----- frames ---------------------------------------------------------

    pub(crate) fn frame(&self) -> &Frame {
        self.frames.last().expect("compiler frame stack is empty")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("compiler frame stack is empty")
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("compiler frame stack underflow")
    }

    pub(crate) fn in_method_scope(&self) -> bool {
        self.frame().scope.is_method()
    }

    pub(crate) fn current_unit(&self) -> &Unit {
        self.program
            .unit(&self.frame().class)
            .expect("current unit missing from program table")
    }

    fn current_method_def(&self) -> &MethodDef {
        let frame = self.frame();
        &self
            .program
            .unit(&frame.class)
            .expect("current unit missing from program table")
            .methods[frame.method]
    }

    pub(crate) fn current_method_is_static(&self) -> bool {
        self.current_method_def().is_static()
    }

    pub(crate) fn new_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    // ----- emission -------------------------------------------------------

    fn code_mut(&mut self) -> &mut Vec<Insn> {
        if let Some(buffer) = self.captures.last_mut() {
            return buffer;
        }
        let frame = self.frames.last().expect("compiler frame stack is empty");
        let unit = self
            .program
            .unit_mut(&frame.class)
            .expect("current unit missing from program table");
        &mut unit.methods[frame.method].code
    }

    /// Emit one instruction, first materializing any pending comparison
    pub(crate) fn emit(&mut self, insn: Insn) {
        self.flush_delayed();
        self.code_mut().push(insn);
    }

    pub(crate) fn emit_many(&mut self, insns: Vec<Insn>) {
        self.flush_delayed();
        self.code_mut().extend(insns);
    }

    /// Emit without touching the delayed slot
    pub(crate) fn raw_emit(&mut self, insn: Insn) {
        self.code_mut().push(insn);
    }

    pub(crate) fn mark(&mut self, label: Label) {
        self.emit(Insn::Label(label));
    }

    pub(crate) fn emit_const(&mut self, constant: Const) {
        let ty = match &constant {
            Const::Int(_) => JType::Int,
            Const::Long(_) => JType::Long,
            Const::Float(_) => JType::Float,
            Const::Double(_) => JType::Double,
            Const::Str(_) => JType::string(),
            Const::Null => JType::nullable_object(types::OBJECT_CLASS),
        };
        self.emit(Insn::Push(constant));
        self.push_type(ty);
    }

    pub(crate) fn emit_bool(&mut self, value: bool) {
        self.emit(Insn::Push(Const::Int(if value { 1 } else { 0 })));
        self.push_type(JType::Boolean);
    }

    pub(crate) fn emit_null(&mut self) {
        self.emit_const(Const::Null);
    }

    /// Swap the top two stack values, handling mixed widths
    pub(crate) fn emit_swap(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Stack too thin to emit swap opcode");
            return;
        };
        let Some(under) = self.peek_under().cloned() else {
            self.error("Stack too thin to emit swap opcode");
            return;
        };

        if under.size() == top.size() {
            match top.size() {
                1 => self.emit(Insn::Simple(op::SWAP)),
                _ => {
                    self.emit(Insn::Simple(op::DUP2_X2));
                    self.emit(Insn::Simple(op::POP2));
                }
            }
        } else {
            match top.size() {
                1 => {
                    self.emit(Insn::Simple(op::DUP_X2));
                    self.emit(Insn::Simple(op::POP));
                }
                _ => {
                    self.emit(Insn::Simple(op::DUP2_X1));
                    self.emit(Insn::Simple(op::POP2));
                }
            }
        }

        let frame = self.frame_mut();
        let len = frame.stack.len();
        frame.stack.swap(len - 1, len - 2);
    }

    // ----- the shadow operand-type stack ---------------------------------

    pub(crate) fn push_type(&mut self, ty: JType) {
        if ty == JType::Void {
            return;
        }
        self.frame_mut().stack.push(ty);
    }

    pub(crate) fn pop_type(&mut self) -> Option<JType> {
        match self.frame_mut().stack.pop() {
            Some(ty) => Some(ty),
            None => {
                self.error("Lost track of stack?");
                None
            }
        }
    }

    pub(crate) fn replace_top(&mut self, ty: JType) {
        self.frame_mut().stack.pop();
        self.push_type(ty);
    }

    pub(crate) fn peek_top(&self) -> Option<&JType> {
        self.frame().stack.last()
    }

    pub(crate) fn peek_under(&self) -> Option<&JType> {
        let stack = &self.frame().stack;
        stack.len().checked_sub(2).map(|i| &stack[i])
    }

    pub(crate) fn stack_depth(&self) -> usize {
        self.frame().stack.len()
    }

    /// Pop and discard everything left on the operand stack; every
    /// statement boundary goes through here so the stack is empty between
    /// statements.
    pub(crate) fn clear_stack(&mut self) {
        self.flush_delayed();
        self.frame_mut().pending_class = None;
        self.frame_mut().pending_call = None;
        while let Some(size) = self.frame().stack.last().map(|t| t.size()) {
            self.frame_mut().stack.pop();
            self.raw_emit(Insn::Simple(if size == 2 { op::POP2 } else { op::POP }));
        }
    }

    // ----- delayed comparisons -------------------------------------------

    /// Park a comparison instead of emitting it; the stack effect (two
    /// operands out, boolean in) applies immediately on the shadow stack.
    pub(crate) fn set_delayed(&mut self, instruction: DelayedInstruction) {
        self.flush_delayed();
        self.frame_mut().delayed = Some(instruction);
        self.pop_type();
        self.pop_type();
        self.push_type(JType::Boolean);
    }

    pub(crate) fn take_delayed(&mut self) -> Option<DelayedInstruction> {
        self.frame_mut().delayed.take()
    }

    /// Materialize a pending comparison into a boolean value
    pub(crate) fn flush_delayed(&mut self) {
        if let Some(instruction) = self.frame_mut().delayed.take() {
            let label_true = self.new_label();
            let label_end = self.new_label();
            let insns = instruction.bool_insns(label_true, label_end);
            self.code_mut().extend(insns);
        }
    }

    /// Branch to `target` when the condition on the stack is false
    pub(crate) fn emit_if_eq(&mut self, target: Label) {
        match self.take_delayed() {
            Some(instruction) => {
                let insns = instruction.invert().jump_insns(target);
                self.code_mut().extend(insns);
            }
            None => self.raw_emit(Insn::Jump { op: op::IFEQ, target }),
        }
        self.pop_type();
    }

    /// Branch to `target` when the condition on the stack is true
    pub(crate) fn emit_if_ne(&mut self, target: Label) {
        match self.take_delayed() {
            Some(instruction) => {
                let insns = instruction.jump_insns(target);
                self.code_mut().extend(insns);
            }
            None => self.raw_emit(Insn::Jump { op: op::IFNE, target }),
        }
        self.pop_type();
    }

    pub(crate) fn has_delayed(&self) -> bool {
        self.frame().delayed.is_some()
    }

    // ----- instruction capture -------------------------------------------

    pub(crate) fn begin_capture(&mut self) {
        self.captures.push(Vec::new());
    }

    pub(crate) fn end_capture(&mut self) -> Vec<Insn> {
        self.captures.pop().unwrap_or_default()
    }

    // ----- locals ---------------------------------------------------------

    pub(crate) fn resolve_local(&self, name: &str) -> Option<Local> {
        self.frame()
            .locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, local)| local.clone())
    }

    pub(crate) fn alloc_local(&mut self, name: &str, ty: JType, start: Label) -> u16 {
        let frame = self.frame_mut();
        let index = frame.max_locals;
        frame.max_locals += ty.size();
        frame.locals.push((
            name.to_string(),
            Local { ty, index, start },
        ));
        index
    }

    /// An anonymous slot (loop iterators and the like)
    pub(crate) fn alloc_hidden_slot(&mut self, width: u16) -> u16 {
        let frame = self.frame_mut();
        let index = frame.max_locals;
        frame.max_locals += width;
        index
    }

    // ----- implicit conversions ------------------------------------------

    /// Convert the top of stack so it can be consumed at `target` type.
    /// Converting to a type the value already has emits nothing.
    pub(crate) fn convert_top_for(&mut self, target: &JType) {
        match target {
            t if t.is_string() => self.convert_top_to_string(),
            t if t.is_object() => self.convert_top_to_object(),
            JType::Int => self.convert_top_to_int(),
            JType::Double => self.convert_top_to_double(),
            JType::Float => self.convert_top_to_float(),
            JType::Boolean => self.convert_top_to_boolean(),
            JType::Long => self.convert_top_to_long(),
            _ => {}
        }
    }

    pub(crate) fn convert_top_to_int(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if top.is_int_like() {
            self.replace_top(JType::Int);
            return;
        }
        match top {
            JType::Float => {
                self.emit(Insn::Simple(op::F2I));
                self.replace_top(JType::Int);
            }
            JType::Long => {
                self.emit(Insn::Simple(op::L2I));
                self.replace_top(JType::Int);
            }
            JType::Double => {
                self.emit(Insn::Simple(op::D2I));
                self.replace_top(JType::Int);
            }
            t if t.is_string() => {
                self.emit(static_call("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I"));
                self.replace_top(JType::Int);
            }
            t if t.is_pure_object() => {
                self.emit(Insn::Type { op: op::CHECKCAST, name: "java/lang/Integer".into() });
                self.emit(virtual_call("java/lang/Integer", "intValue", "()I"));
                self.replace_top(JType::Int);
            }
            t => {
                let message = format!("Cannot convert {} into an integer", t.descriptor());
                self.error(&message);
            }
        }
    }

    pub(crate) fn convert_top_to_long(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if top == JType::Long {
            return;
        }
        match top {
            t if t.is_int_like() => {
                self.emit(Insn::Simple(op::I2L));
                self.replace_top(JType::Long);
            }
            JType::Float => {
                self.emit(Insn::Simple(op::F2L));
                self.replace_top(JType::Long);
            }
            JType::Double => {
                self.emit(Insn::Simple(op::D2L));
                self.replace_top(JType::Long);
            }
            t if t.is_string() => {
                self.emit(static_call("java/lang/Long", "parseLong", "(Ljava/lang/String;)J"));
                self.replace_top(JType::Long);
            }
            t if t.is_pure_object() => {
                self.emit(Insn::Type { op: op::CHECKCAST, name: "java/lang/Long".into() });
                self.emit(virtual_call("java/lang/Long", "longValue", "()J"));
                self.replace_top(JType::Long);
            }
            t => {
                let message = format!("Cannot convert {} into a long", t.descriptor());
                self.error(&message);
            }
        }
    }

    pub(crate) fn convert_top_to_float(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if top == JType::Float {
            return;
        }
        match top {
            t if t.is_int_like() => {
                self.emit(Insn::Simple(op::I2F));
                self.replace_top(JType::Float);
            }
            JType::Long => {
                self.emit(Insn::Simple(op::L2F));
                self.replace_top(JType::Float);
            }
            JType::Double => {
                self.emit(Insn::Simple(op::D2F));
                self.replace_top(JType::Float);
            }
            t if t.is_string() => {
                self.emit(static_call("java/lang/Float", "parseFloat", "(Ljava/lang/String;)F"));
                self.replace_top(JType::Float);
            }
            t if t.is_pure_object() => {
                self.emit(Insn::Type { op: op::CHECKCAST, name: "java/lang/Float".into() });
                self.emit(virtual_call("java/lang/Float", "floatValue", "()F"));
                self.replace_top(JType::Float);
            }
            t => {
                let message = format!("Cannot convert {} into a float", t.descriptor());
                self.error(&message);
            }
        }
    }

    pub(crate) fn convert_top_to_double(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if top == JType::Double {
            return;
        }
        match top {
            t if t.is_int_like() => {
                self.emit(Insn::Simple(op::I2D));
                self.replace_top(JType::Double);
            }
            JType::Float => {
                self.emit(Insn::Simple(op::F2D));
                self.replace_top(JType::Double);
            }
            JType::Long => {
                self.emit(Insn::Simple(op::L2D));
                self.replace_top(JType::Double);
            }
            t if t.is_string() => {
                self.emit(static_call("java/lang/Double", "parseDouble", "(Ljava/lang/String;)D"));
                self.replace_top(JType::Double);
            }
            t if t.is_pure_object() => {
                self.emit(Insn::Type { op: op::CHECKCAST, name: "java/lang/Double".into() });
                self.emit(virtual_call("java/lang/Double", "doubleValue", "()D"));
                self.replace_top(JType::Double);
            }
            t => {
                let message = format!("Cannot convert {} into a double", t.descriptor());
                self.error(&message);
            }
        }
    }

    pub(crate) fn convert_top_to_boolean(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if top == JType::Boolean {
            return;
        }
        match top {
            t if t.is_string() => {
                self.emit(static_call(
                    "java/lang/Boolean",
                    "parseBoolean",
                    "(Ljava/lang/String;)Z",
                ));
                self.replace_top(JType::Boolean);
            }
            t if t.is_pure_object() => {
                self.emit(Insn::Type { op: op::CHECKCAST, name: "java/lang/Boolean".into() });
                self.emit(virtual_call("java/lang/Boolean", "booleanValue", "()Z"));
                self.replace_top(JType::Boolean);
            }
            t if t.is_int_like() => self.replace_top(JType::Boolean),
            t => {
                let message = format!("Cannot convert {} into a boolean", t.descriptor());
                self.error(&message);
            }
        }
    }

    /// Box primitives; object values pass through untouched
    pub(crate) fn convert_top_to_object(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.emit_null();
            return;
        };
        if top.is_object() {
            return;
        }
        if top.is_int_like() && top != JType::Boolean {
            self.convert_top_to_int();
        }
        let Some(top) = self.peek_top().cloned() else { return };
        match top.boxed_class() {
            Some(boxed) => {
                let desc = format!("({}){}", top.descriptor(), format!("L{};", boxed));
                self.emit(static_call(boxed, "valueOf", &desc));
                self.replace_top(JType::object(boxed));
            }
            None => {
                let message = format!("Cannot convert {} into an object", top.descriptor());
                self.error(&message);
            }
        }
    }

    /// Stringify any value: arrays and objects through the runtime
    /// helpers, primitives through `String.valueOf`.
    pub(crate) fn convert_top_to_string(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.emit_const(Const::Str("null".to_string()));
            return;
        };
        if top.is_string() {
            return;
        }
        if top.is_array() {
            self.emit(static_call(
                builtins::STD_CLASS,
                "arrayToString",
                "(Ljava/lang/Object;)Ljava/lang/String;",
            ));
        } else if top.is_pure_object() {
            self.emit(static_call(
                builtins::STD_CLASS,
                "toString",
                "(Ljava/lang/Object;)Ljava/lang/String;",
            ));
        } else {
            let arg = if top.is_int_like() && !matches!(top, JType::Boolean | JType::Char) {
                "I".to_string()
            } else {
                top.descriptor()
            };
            let desc = format!("({})Ljava/lang/String;", arg);
            self.emit(static_call("java/lang/String", "valueOf", &desc));
        }
        self.replace_top(JType::string());
    }

    // ----- expressions (Pratt driver) ------------------------------------

    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    pub(crate) fn expression_statement(&mut self, clear: bool, require_semicolon: bool) {
        self.expression();
        if require_semicolon {
            self.consume(TokenKind::Semicolon, "Expect \";\"");
        } else {
            self.match_kind(TokenKind::Semicolon);
        }
        if clear {
            self.clear_stack();
        }
    }

    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let rule = rules::rule_for(self.parser.previous.kind);
        let Some(prefix) = rule.prefix else {
            let message = format!(
                "Expected expression, but got \"{}\" instead",
                self.parser.previous.lexeme
            );
            self.error(&message);
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        self.run_prefix(prefix, can_assign);

        while precedence <= rules::rule_for(self.parser.current.kind).precedence {
            if self.parser.panic_mode {
                return;
            }
            self.advance();
            match rules::rule_for(self.parser.previous.kind).infix {
                Some(infix) => self.run_infix(infix, can_assign),
                None => return,
            }
        }

        if can_assign && self.match_kind(TokenKind::Equal) {
            self.error("Invalid assignment target");
        }
    }

    // ----- identifier and type parsing -----------------------------------

    pub(crate) fn parse_identifier(&mut self, message: &str) -> String {
        self.consume(TokenKind::Identifier, message);
        self.parser.previous.lexeme.clone()
    }

    /// Resolve a source-level (possibly dotted) class name through the
    /// import table, the program table, then the plain qualified form.
    pub(crate) fn resolve_class_name(&self, dotted: &str) -> String {
        if !dotted.contains('.') {
            if let Some(internal) = self.imports.get(dotted) {
                return internal.clone();
            }
            let package_path = self.file_package.replace('.', "/");
            let in_package = if package_path.is_empty() {
                dotted.to_string()
            } else {
                format!("{}/{}", package_path, dotted)
            };
            if self.program.contains(&in_package) {
                return in_package;
            }
        }
        dotted.replace('.', "/")
    }

    /// Parse a type name: `pkg.Name`, generics, trailing `[]` pairs.
    /// Nullability (`?`) is the caller's to consume, as its placement
    /// differs per construct.
    pub(crate) fn parse_type(&mut self, message: &str) -> Option<JType> {
        self.consume(TokenKind::Identifier, message);
        if self.parser.previous.kind != TokenKind::Identifier {
            return None;
        }
        let mut dotted = self.parser.previous.lexeme.clone();
        while self.match_kind(TokenKind::Dot) {
            dotted.push('.');
            dotted.push_str(&self.parse_identifier("Expected name after \".\""));
        }

        let mut ty = if dotted.contains('.') {
            JType::from_class_name(&dotted)
        } else {
            match &dotted[..] {
                "void" | "boolean" | "char" | "byte" | "short" | "int" | "float" | "long"
                | "double" => JType::from_class_name(&dotted),
                _ => JType::object(self.resolve_class_name(&dotted)),
            }
        };

        let args = self.parse_generic_args();
        if !args.is_empty() {
            ty = ty.with_args(args);
        }

        while self.match_kind(TokenKind::LeftBracket) {
            self.consume(TokenKind::RightBracket, "Expect \"]\" after \"[\"");
            ty = JType::array_of(ty);
        }

        Some(ty)
    }

    pub(crate) fn parse_generic_args(&mut self) -> Vec<JType> {
        let mut args = Vec::new();
        if self.match_kind(TokenKind::Less) {
            if !self.check(TokenKind::Greater) {
                loop {
                    if let Some(arg) = self.parse_type("Invalid type!") {
                        args.push(arg);
                    }
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::Greater, "Expected \">\" after generics!");
        }
        args
    }

    /// `: Type` as used after parameter and variable names
    pub(crate) fn consume_type(&mut self, message: &str) -> Option<JType> {
        self.consume(TokenKind::Colon, message);
        self.parse_type("Expected type name after \":\".")
    }

    // ----- member resolution ----------------------------------------------

    /// Field lookup: program table first, then the external universe.
    /// Returns (descriptor, is_static, nullable).
    pub(crate) fn find_field(&self, owner: &str, name: &str) -> Option<(String, bool, bool)> {
        if let Some(unit) = self.program.unit(owner) {
            if let Some(field) = unit.field(name) {
                return Some((field.descriptor.clone(), field.is_static(), field.nullable));
            }
        }
        let class = self.universe.class(owner)?;
        let field = class.find_field(name)?;
        Some((field.descriptor.clone(), field.is_static, false))
    }

    /// Property accessor lookup by marker. Returns the accessor's
    /// (method descriptor, property type descriptor, is_static).
    pub(crate) fn find_property(
        &self,
        owner: &str,
        name: &str,
        kind: crate::program::PropertyKind,
        want_static: bool,
    ) -> Option<(String, String, bool)> {
        if let Some(unit) = self.program.unit(owner) {
            for method in &unit.methods {
                if method.name != name || method.is_static() != want_static {
                    continue;
                }
                if let Some((marker_kind, prop_desc)) = &method.markers.property {
                    if *marker_kind == kind {
                        return Some((
                            method.descriptor.clone(),
                            prop_desc.clone(),
                            method.is_static(),
                        ));
                    }
                }
            }
        }
        let class = self.universe.class(owner)?;
        for method in &class.methods {
            if method.name != name || method.is_static != want_static {
                continue;
            }
            if let Some((marker_kind, prop_desc)) = &method.property {
                if *marker_kind == kind {
                    return Some((method.descriptor.clone(), prop_desc.clone(), method.is_static));
                }
            }
        }
        None
    }

    /// Method lookup by name and arity: program table first, then the
    /// external universe.
    pub(crate) fn resolve_callable(
        &self,
        owner: &str,
        name: &str,
        arity: usize,
    ) -> Option<ResolvedMethod> {
        if let Some(unit) = self.program.unit(owner) {
            if let Some(method) = unit.method_by_arity(name, arity) {
                return Some(ResolvedMethod {
                    owner: owner.to_string(),
                    name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                    is_static: method.is_static(),
                    is_interface: false,
                });
            }
        }
        let class = self.universe.class(owner)?;
        let method = class.find_method(name, arity)?;
        Some(ResolvedMethod {
            owner: owner.to_string(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            is_static: method.is_static,
            is_interface: class.is_interface,
        })
    }

    /// Whether `internal_name` is a subtype of `target`, walking through
    /// both program-table units and the external universe.
    pub(crate) fn is_subtype(&self, internal_name: &str, target: &str) -> bool {
        if internal_name == target {
            return true;
        }
        if let Some(unit) = self.program.unit(internal_name) {
            return self.is_subtype(&unit.super_name.clone(), target);
        }
        crate::universe::is_subtype_of(self.universe, internal_name, target)
    }

    /// Copy `@Inline`-marked static members of a class into the per-file
    /// inline tables.
    pub(crate) fn import_members(&mut self, internal_name: &str) {
        if let Some(unit) = self.program.unit(internal_name) {
            let methods: Vec<InlineMethod> = unit
                .methods
                .iter()
                .filter(|m| m.is_static() && m.markers.inline)
                .map(|m| InlineMethod {
                    owner: internal_name.to_string(),
                    name: m.name.clone(),
                    descriptor: m.descriptor.clone(),
                })
                .collect();
            let fields: Vec<InlineField> = unit
                .fields
                .iter()
                .filter(|f| f.is_static() && f.inline)
                .map(|f| InlineField {
                    owner: internal_name.to_string(),
                    name: f.name.clone(),
                    descriptor: f.descriptor.clone(),
                })
                .collect();
            self.inline_methods.extend(methods);
            self.inline_fields.extend(fields);
            return;
        }
        if let Some(class) = self.universe.class(internal_name) {
            for method in &class.methods {
                if method.is_static && method.inline {
                    self.inline_methods.push(InlineMethod {
                        owner: internal_name.to_string(),
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                    });
                }
            }
            for field in &class.fields {
                if field.is_static && field.inline {
                    self.inline_fields.push(InlineField {
                        owner: internal_name.to_string(),
                        name: field.name.clone(),
                        descriptor: field.descriptor.clone(),
                    });
                }
            }
        }
    }

    // ----- argument handling ----------------------------------------------

    /// Parse a parenthesized argument list, capturing each argument's
    /// instructions with its inferred type so the call site can replay
    /// them with per-parameter conversions once the target is resolved.
    pub(crate) fn captured_arguments(&mut self) -> Vec<(Vec<Insn>, JType)> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                self.begin_capture();
                self.expression();
                self.flush_delayed();
                let insns = self.end_capture();
                let ty = self.pop_type().unwrap_or(JType::any_object());
                args.push((insns, ty));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect \")\" after arguments");
        args
    }

    /// Replay captured arguments, converting each to its declared
    /// parameter type when a target descriptor is known.
    pub(crate) fn replay_arguments(
        &mut self,
        args: Vec<(Vec<Insn>, JType)>,
        params: Option<&[JType]>,
    ) {
        for (i, (insns, ty)) in args.into_iter().enumerate() {
            self.emit_many(insns);
            self.push_type(ty);
            if let Some(params) = params {
                if let Some(param) = params.get(i) {
                    self.convert_top_for(param);
                }
            }
        }
    }

    /// Emit a resolved invocation; assumes receiver (if any) and
    /// arguments are already on both stacks.
    pub(crate) fn emit_invoke(&mut self, resolved: &ResolvedMethod, has_receiver: bool) {
        let opcode = if resolved.is_static {
            op::INVOKESTATIC
        } else if resolved.is_interface {
            op::INVOKEINTERFACE
        } else {
            op::INVOKEVIRTUAL
        };
        self.emit(Insn::Method {
            op: opcode,
            owner: resolved.owner.clone(),
            name: resolved.name.clone(),
            desc: resolved.descriptor.clone(),
            itf: resolved.is_interface,
        });
        let (params, ret) =
            parse_method_descriptor(&resolved.descriptor).unwrap_or((Vec::new(), JType::Void));
        for _ in 0..params.len() {
            self.pop_type();
        }
        if has_receiver {
            self.pop_type();
        }
        self.push_type(ret);
    }
}

/// invokestatic helper used by the conversion family
pub(crate) fn static_call(owner: &str, name: &str, desc: &str) -> Insn {
    Insn::Method {
        op: op::INVOKESTATIC,
        owner: owner.to_string(),
        name: name.to_string(),
        desc: desc.to_string(),
        itf: false,
    }
}

/// invokevirtual helper used by the conversion family
pub(crate) fn virtual_call(owner: &str, name: &str, desc: &str) -> Insn {
    Insn::Method {
        op: op::INVOKEVIRTUAL,
        owner: owner.to_string(),
        name: name.to_string(),
        desc: desc.to_string(),
        itf: false,
    }
}
