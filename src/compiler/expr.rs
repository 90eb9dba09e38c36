//! Expression parse actions
//!
//! Each prefix/infix action emits bytecode as it parses, keeping the
//! shadow operand-type stack in step with the runtime stack.

use crate::classfile::code::{Const, Insn};
use crate::classfile::opcodes as op;
use crate::parser::{NumberKind, TokenKind};
use crate::program::{AnnotationDef, AnnotationValue, PropertyKind};

use super::delayed::{CompareFamily, CompareOp, DelayedInstruction};
use super::rules::{InfixRule, Precedence, PrefixRule};
use super::types::{method_descriptor, parse_method_descriptor, JType, OBJECT_CLASS};
use super::{virtual_call, Compiler, InlineField, PendingCall, Scope, MAGIC_PREFIX};

fn flip_comparison(kind: TokenKind) -> TokenKind {
    match kind {
        TokenKind::Greater => TokenKind::Less,
        TokenKind::Less => TokenKind::Greater,
        TokenKind::GreaterEqual => TokenKind::LessEqual,
        TokenKind::LessEqual => TokenKind::GreaterEqual,
        other => other,
    }
}

fn compare_op_of(kind: TokenKind) -> CompareOp {
    match kind {
        TokenKind::EqualEqual => CompareOp::Eq,
        TokenKind::BangEqual => CompareOp::Ne,
        TokenKind::Greater => CompareOp::Gt,
        TokenKind::GreaterEqual => CompareOp::Ge,
        TokenKind::Less => CompareOp::Lt,
        _ => CompareOp::Le,
    }
}

fn numeric_rank(ty: &JType) -> u8 {
    match ty {
        t if t.is_int_like() => 0,
        JType::Long => 1,
        JType::Float => 2,
        JType::Double => 3,
        _ => 0,
    }
}

fn family_of(ty: &JType) -> CompareFamily {
    match ty {
        JType::Long => CompareFamily::Long,
        JType::Float => CompareFamily::Float,
        JType::Double => CompareFamily::Double,
        _ => CompareFamily::Int,
    }
}

fn constant_value(insns: &[Insn]) -> Option<AnnotationValue> {
    match insns {
        [Insn::Push(Const::Int(v))] => Some(AnnotationValue::Int(*v)),
        [Insn::Push(Const::Long(v))] => Some(AnnotationValue::Long(*v)),
        [Insn::Push(Const::Float(v))] => Some(AnnotationValue::Float(*v)),
        [Insn::Push(Const::Double(v))] => Some(AnnotationValue::Double(*v)),
        [Insn::Push(Const::Str(v))] => Some(AnnotationValue::Str(v.clone())),
        _ => None,
    }
}

impl<'a> Compiler<'a> {
    pub(crate) fn run_prefix(&mut self, rule: PrefixRule, can_assign: bool) {
        match rule {
            PrefixRule::Grouping => self.grouping(),
            PrefixRule::Unary => self.unary(),
            PrefixRule::Variable => self.variable(can_assign),
            PrefixRule::Number => self.number(),
            PrefixRule::Str => self.string_literal(),
            PrefixRule::Literal => self.literal(),
            PrefixRule::Array => self.array_literal(),
            PrefixRule::Cast => self.cast(),
            PrefixRule::Import => self.import_declaration(),
            PrefixRule::Annotation => self.annotation(),
        }
    }

    pub(crate) fn run_infix(&mut self, rule: InfixRule, can_assign: bool) {
        match rule {
            InfixRule::Binary => self.binary(),
            InfixRule::And => self.and_operator(),
            InfixRule::Or => self.or_operator(),
            InfixRule::Call => self.call(),
            InfixRule::Dot => self.dot(can_assign),
            InfixRule::QDot => self.question_dot(can_assign),
            InfixRule::Elvis => self.elvis(),
            InfixRule::Ternary => self.ternary(),
            InfixRule::Subscript => self.subscript(can_assign),
            InfixRule::SpecialDot => self.special_dot(),
        }
    }

    // ----- literals -------------------------------------------------------

    fn number(&mut self) {
        let token = self.parser.previous.clone();
        let kind = token.number_kind.unwrap_or(NumberKind::Int);
        let text: &str = token.lexeme.trim_end_matches(|c| matches!(c, 'l' | 'f' | 'd'));
        match kind {
            NumberKind::Int => match text.parse::<i32>() {
                Ok(value) => self.emit_const(Const::Int(value)),
                Err(_) => self.error("Integer literal out of range"),
            },
            NumberKind::Long => match text.parse::<i64>() {
                Ok(value) => self.emit_const(Const::Long(value)),
                Err(_) => self.error("Long literal out of range"),
            },
            NumberKind::Float => match text.parse::<f32>() {
                Ok(value) => self.emit_const(Const::Float(value)),
                Err(_) => self.error("Invalid float literal"),
            },
            NumberKind::Double => match text.parse::<f64>() {
                Ok(value) => self.emit_const(Const::Double(value)),
                Err(_) => self.error("Invalid double literal"),
            },
        }
    }

    fn string_literal(&mut self) {
        let lexeme = &self.parser.previous.lexeme;
        let content = lexeme[1..lexeme.len() - 1].to_string();
        self.emit_const(Const::Str(content));
    }

    fn literal(&mut self) {
        match self.parser.previous.kind {
            TokenKind::False => self.emit_bool(false),
            TokenKind::True => self.emit_bool(true),
            TokenKind::Null => self.emit_null(),
            _ => {}
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect \")\" after expression");
    }

    // ----- unary and binary operators -------------------------------------

    fn unary(&mut self) {
        let op_kind = self.parser.previous.kind;
        self.parse_precedence(Precedence::Unary);

        match op_kind {
            TokenKind::Bang => {
                // a pending comparison negates for free
                if let Some(delayed) = self.take_delayed() {
                    self.frame_mut().delayed = Some(delayed.invert());
                    return;
                }
                match self.peek_top() {
                    Some(t) if t.is_int_like() => self.negate_top_boolean(),
                    _ => self.error("Operand of \"!\" must be a boolean"),
                }
            }
            TokenKind::Minus => {
                self.flush_delayed();
                let Some(top) = self.peek_top().cloned() else {
                    self.error("Lost track of stack?");
                    return;
                };
                if !top.is_number() {
                    let message =
                        format!("Can't apply operator NEGATE to {}", top.descriptor());
                    self.error(&message);
                    return;
                }
                let ty = if top.is_int_like() { JType::Int } else { top };
                self.emit(Insn::Simple(ty.arith(op::INEG)));
                self.replace_top(ty);
            }
            _ => {}
        }
    }

    fn negate_top_boolean(&mut self) {
        self.emit(Insn::Push(Const::Int(1)));
        self.push_type(JType::Int);
        self.emit(Insn::Simple(op::IXOR));
        self.pop_type();
        self.pop_type();
        self.push_type(JType::Boolean);
    }

    /// Unify both numeric operands to the wider kind. The buried operand
    /// converts through a swap/convert/swap-back sequence; same-rank
    /// operands only have their shadow types normalized.
    fn promote_numeric_pair(&mut self) -> JType {
        let Some(rhs) = self.peek_top().cloned() else { return JType::Int };
        let Some(lhs) = self.peek_under().cloned() else { return JType::Int };

        let unified = match numeric_rank(&lhs).max(numeric_rank(&rhs)) {
            0 => JType::Int,
            1 => JType::Long,
            2 => JType::Float,
            _ => JType::Double,
        };

        if rhs != unified {
            self.convert_top_for(&unified);
        }
        if lhs != unified {
            if numeric_rank(&lhs) == numeric_rank(&unified) {
                // same runtime representation; fix the shadow type only
                let stack = &mut self.frame_mut().stack;
                let index = stack.len() - 2;
                stack[index] = unified.clone();
            } else {
                self.emit_swap();
                self.convert_top_for(&unified);
                self.emit_swap();
            }
        }
        unified
    }

    /// Resolve a conventional operator method on `lhs` and compile the
    /// operator to a virtual call. The right operand is on top of the
    /// stack and converts to the declared parameter type.
    fn try_magic_binary(&mut self, name: &str, lhs: &JType) -> bool {
        let full = format!("{}{}", MAGIC_PREFIX, name);
        let Some(resolved) = self.resolve_callable(&lhs.internal_name(), &full, 1) else {
            return false;
        };
        if resolved.is_static {
            return false;
        }
        if let Some((params, _)) = parse_method_descriptor(&resolved.descriptor) {
            if let Some(param) = params.first() {
                self.convert_top_for(param);
            }
        }
        self.emit_invoke(&resolved, true);
        true
    }

    fn binary(&mut self) {
        let mut op_kind = self.parser.previous.kind;
        let rule = super::rules::rule_for(op_kind);
        self.parse_precedence(rule.precedence.next());
        self.flush_delayed();

        let (Some(rhs0), Some(lhs0)) = (self.peek_top().cloned(), self.peek_under().cloned())
        else {
            self.error("Unable to compute last stack");
            return;
        };
        let (mut lhs, mut rhs) = (lhs0, rhs0);

        let comparison = matches!(
            op_kind,
            TokenKind::EqualEqual
                | TokenKind::BangEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Less
                | TokenKind::LessEqual
        );

        // mixed number/object comparison: swap so the object sits in
        // receiver position, flipping the comparison direction
        if comparison && lhs.is_number() && rhs.is_pure_object() {
            self.emit_swap();
            std::mem::swap(&mut lhs, &mut rhs);
            op_kind = flip_comparison(op_kind);
        }

        match op_kind {
            TokenKind::EqualEqual | TokenKind::BangEqual => {
                let negate = op_kind == TokenKind::BangEqual;
                if lhs.is_number() && rhs.is_number() {
                    let unified = self.promote_numeric_pair();
                    self.set_delayed(DelayedInstruction::new(
                        family_of(&unified),
                        if negate { CompareOp::Ne } else { CompareOp::Eq },
                    ));
                } else if lhs.is_pure_object() && self.try_magic_binary("eq", &lhs) {
                    if negate {
                        self.negate_top_boolean();
                    }
                } else if lhs.is_object() {
                    if negate {
                        self.set_delayed(DelayedInstruction::new(CompareFamily::Ref, CompareOp::Ne));
                    } else {
                        self.convert_top_to_object();
                        self.emit(virtual_call(
                            OBJECT_CLASS,
                            "equals",
                            "(Ljava/lang/Object;)Z",
                        ));
                        self.pop_type();
                        self.pop_type();
                        self.push_type(JType::Boolean);
                    }
                } else {
                    let message =
                        format!("Can't apply operator EQUAL to {}", lhs.descriptor());
                    self.error(&message);
                }
            }
            TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less
            | TokenKind::LessEqual => {
                if lhs.is_number() && rhs.is_number() {
                    let unified = self.promote_numeric_pair();
                    self.set_delayed(DelayedInstruction::new(
                        family_of(&unified),
                        compare_op_of(op_kind),
                    ));
                } else if lhs.is_pure_object() {
                    let (name, label) = match op_kind {
                        TokenKind::Greater => ("gt", "GREATER"),
                        TokenKind::GreaterEqual => ("ge", "GREATER_EQUAL"),
                        TokenKind::Less => ("lt", "LESS"),
                        _ => ("le", "LESS_EQUAL"),
                    };
                    if !self.try_magic_binary(name, &lhs) {
                        let message = format!(
                            "Can't apply operator {} to {}",
                            label,
                            lhs.internal_name()
                        );
                        self.error_at_current(&message);
                    }
                } else {
                    let message =
                        format!("Can't apply operator COMPARE to {}", lhs.descriptor());
                    self.error(&message);
                }
            }
            TokenKind::Plus => {
                if lhs.is_string() || rhs.is_string() {
                    if !rhs.is_string() {
                        self.convert_top_to_string();
                    }
                    if !lhs.is_string() {
                        self.emit_swap();
                        self.convert_top_to_string();
                        self.emit_swap();
                    }
                    self.emit(virtual_call(
                        "java/lang/String",
                        "concat",
                        "(Ljava/lang/String;)Ljava/lang/String;",
                    ));
                    self.pop_type();
                    self.pop_type();
                    self.push_type(JType::string());
                } else {
                    self.arith_or_magic(op::IADD, "add", "ADD", &lhs, &rhs);
                }
            }
            TokenKind::Minus => self.arith_or_magic(op::ISUB, "subtract", "SUBTRACT", &lhs, &rhs),
            TokenKind::Star => self.arith_or_magic(op::IMUL, "multiply", "MULTIPLY", &lhs, &rhs),
            TokenKind::Slash => self.arith_or_magic(op::IDIV, "divide", "DIVIDE", &lhs, &rhs),
            _ => {
                let message = format!("Cannot use {:?} as a binary operator", op_kind);
                self.error(&message);
            }
        }
    }

    fn arith_or_magic(&mut self, base: u8, magic: &str, label: &str, lhs: &JType, rhs: &JType) {
        if lhs.is_number() && rhs.is_number() {
            let unified = self.promote_numeric_pair();
            self.emit(Insn::Simple(unified.arith(base)));
            self.pop_type();
            self.pop_type();
            self.push_type(unified);
        } else if lhs.is_pure_object() {
            if !self.try_magic_binary(magic, lhs) {
                let message =
                    format!("Can't apply operator {} to {}", label, lhs.internal_name());
                self.error_at_current(&message);
            }
        } else {
            let message = format!("Can't apply operator {} to {}", label, lhs.descriptor());
            self.error(&message);
        }
    }

    // ----- logical operators ----------------------------------------------

    fn and_operator(&mut self) {
        let label_false = self.new_label();
        let label_end = self.new_label();

        self.emit_if_eq(label_false);
        self.parse_precedence(Precedence::And);
        self.emit_if_eq(label_false);

        self.emit(Insn::Push(Const::Int(1)));
        self.emit(Insn::Jump { op: op::GOTO, target: label_end });
        self.mark(label_false);
        self.emit(Insn::Push(Const::Int(0)));
        self.mark(label_end);

        self.push_type(JType::Boolean);
    }

    fn or_operator(&mut self) {
        let label_true = self.new_label();
        let label_false = self.new_label();
        let label_end = self.new_label();

        self.emit_if_ne(label_true);
        self.parse_precedence(Precedence::Or);
        self.emit_if_eq(label_false);

        self.mark(label_true);
        self.emit(Insn::Push(Const::Int(1)));
        self.emit(Insn::Jump { op: op::GOTO, target: label_end });
        self.mark(label_false);
        self.emit(Insn::Push(Const::Int(0)));
        self.mark(label_end);

        self.push_type(JType::Boolean);
    }

    // ----- conditional expressions ----------------------------------------

    fn ternary(&mut self) {
        if !self.has_delayed() && !matches!(self.peek_top(), Some(JType::Boolean)) {
            self.error("Last stack isn't a boolean!");
            return;
        }
        let label_else = self.new_label();
        let label_end = self.new_label();

        self.emit_if_eq(label_else);
        self.parse_precedence(Precedence::Primary);
        self.flush_delayed();
        self.emit(Insn::Jump { op: op::GOTO, target: label_end });

        self.consume(TokenKind::Colon, "Expected \":\" after expression!");
        self.mark(label_else);
        self.expression();
        self.flush_delayed();
        self.mark(label_end);

        // both arms pushed a value; the merge keeps one
        self.pop_type();
    }

    /// `value ?: fallback-statement` — runs the statement when the value
    /// is null; the fallback is expected to diverge (return).
    fn elvis(&mut self) {
        let Some(top) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        let label_null = self.new_label();
        let label_end = self.new_label();

        self.emit(Insn::Simple(op::DUP));
        self.push_type(top.clone());
        self.emit(Insn::Jump { op: op::IFNULL, target: label_null });
        self.pop_type();

        self.emit(Insn::Jump { op: op::GOTO, target: label_end });
        self.mark(label_null);
        self.raw_emit(Insn::Simple(op::POP));

        // the null path consumed the value; hide it while the fallback
        // statement compiles
        let saved = self.frame_mut().stack.pop();
        self.statement(false);
        if let Some(value) = saved {
            self.frame_mut().stack.push(value.with_nullable(false));
        }

        self.mark(label_end);
    }

    /// Null-propagating member access: duplicates and null-checks the
    /// receiver, branching around the access entirely when it is null.
    fn question_dot(&mut self, can_assign: bool) {
        let Some(recv) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        if !recv.nullable() {
            self.dot(can_assign);
            return;
        }

        self.consume(TokenKind::Identifier, "Expect property name!");
        let name = self.parser.previous.lexeme.clone();
        if can_assign && self.check(TokenKind::Equal) {
            self.error("Can't assign through \"?.\"");
            return;
        }

        let label_null = self.new_label();
        let label_end = self.new_label();

        self.emit(Insn::Simple(op::DUP));
        self.push_type(recv.clone());
        self.emit(Insn::Jump { op: op::IFNULL, target: label_null });
        self.pop_type();

        let base_depth = self.stack_depth(); // receiver included
        self.replace_top(recv.clone().with_nullable(false));
        self.dot_get(&name);
        if self.frame().pending_call.is_some() {
            self.consume(TokenKind::LeftParen, "Expect \"(\" after method name");
            if let Some(pending) = self.frame_mut().pending_call.take() {
                self.call_method(pending);
            }
        }
        self.flush_delayed();

        // both arms must leave exactly one object
        if self.stack_depth() < base_depth {
            self.emit_null();
        } else {
            self.convert_top_to_object();
        }
        self.pop_type();

        self.emit(Insn::Jump { op: op::GOTO, target: label_end });
        self.mark(label_null);
        self.raw_emit(Insn::Simple(op::POP));
        self.raw_emit(Insn::Push(Const::Null));
        self.mark(label_end);

        self.push_type(JType::nullable_object(OBJECT_CLASS));
    }

    // ----- identifiers ----------------------------------------------------

    fn variable(&mut self, can_assign: bool) {
        let identifier = self.parser.previous.lexeme.clone();
        let local = if self.in_method_scope() {
            self.resolve_local(&identifier)
        } else {
            None
        };

        if can_assign && self.match_kind(TokenKind::Equal) {
            self.assign_variable(&identifier, local);
        } else if can_assign && self.match_kind(TokenKind::PlusEqual) {
            self.compound_assign(&identifier, local, op::IADD);
        } else if can_assign && self.match_kind(TokenKind::MinusEqual) {
            self.compound_assign(&identifier, local, op::ISUB);
        } else if can_assign && self.match_kind(TokenKind::StarEqual) {
            self.compound_assign(&identifier, local, op::IMUL);
        } else if can_assign && self.match_kind(TokenKind::SlashEqual) {
            self.compound_assign(&identifier, local, op::IDIV);
        } else {
            self.read_variable(&identifier, local);
        }
    }

    fn find_inline_field(&self, name: &str) -> Option<InlineField> {
        self.inline_fields
            .iter()
            .rev()
            .find(|f| f.name == name)
            .cloned()
    }

    fn lookup_class_literal(&self, name: &str) -> Option<String> {
        if let Some(internal) = self.imports.get(name) {
            return Some(internal.clone());
        }
        let package_path = self.file_package.replace('.', "/");
        let in_package = if package_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", package_path, name)
        };
        self.program.contains(&in_package).then_some(in_package)
    }

    fn read_variable(&mut self, identifier: &str, local: Option<super::Local>) {
        // call position with no matching local: inline fn or own method
        if self.check(TokenKind::LeftParen) && local.is_none() {
            if self.inline_methods.iter().any(|m| m.name == identifier) {
                self.match_kind(TokenKind::LeftParen);
                self.call_inline(identifier);
                return;
            }
            let target = self
                .method_renames
                .get(identifier)
                .cloned()
                .unwrap_or_else(|| identifier.to_string());
            let owner = self.frame().class.clone();
            self.frame_mut().pending_call = Some(PendingCall::Auto { owner, name: target });
            return;
        }

        if let Some(internal) = self.lookup_class_literal(identifier) {
            self.frame_mut().pending_class = Some(JType::object(internal));
            return;
        }

        if let Some(field) = self.find_inline_field(identifier) {
            let ty = JType::from_descriptor(&field.descriptor).unwrap_or(JType::any_object());
            self.emit(Insn::Field {
                op: op::GETSTATIC,
                owner: field.owner,
                name: field.name,
                desc: field.descriptor,
            });
            self.push_type(ty);
            return;
        }

        if let Some(local) = local {
            self.emit(Insn::Var { op: local.ty.load_op(), index: local.index });
            self.push_type(local.ty);
            return;
        }

        let owner = self.frame().class.clone();
        if let Some((desc, is_static, nullable)) = self.find_field(&owner, identifier) {
            let ty = JType::from_descriptor(&desc)
                .unwrap_or(JType::any_object())
                .with_nullable(nullable);
            if is_static {
                self.emit(Insn::Field {
                    op: op::GETSTATIC,
                    owner,
                    name: identifier.to_string(),
                    desc,
                });
                self.push_type(ty);
            } else {
                if self.current_method_is_static() {
                    let message = format!(
                        "Can't access instance field \"{}\" from static code",
                        identifier
                    );
                    self.error(&message);
                    return;
                }
                self.emit(Insn::Var { op: op::ALOAD, index: 0 });
                self.push_type(JType::object(owner.clone()));
                self.emit(Insn::Field {
                    op: op::GETFIELD,
                    owner,
                    name: identifier.to_string(),
                    desc,
                });
                self.pop_type();
                self.push_type(ty);
            }
            return;
        }

        let message = format!("Variable \"{}\" does not exist", identifier);
        self.error(&message);
    }

    fn assign_variable(&mut self, identifier: &str, local: Option<super::Local>) {
        // capture the value so instance-field targets can load `this` first
        self.begin_capture();
        self.expression();
        self.flush_delayed();
        let value = self.end_capture();
        let Some(value_ty) = self.pop_type() else { return };

        if let Some(field) = self.find_inline_field(identifier) {
            let ty = JType::from_descriptor(&field.descriptor).unwrap_or(JType::any_object());
            self.emit_many(value);
            self.push_type(value_ty);
            self.convert_top_for(&ty);
            self.emit(Insn::Field {
                op: op::PUTSTATIC,
                owner: field.owner,
                name: field.name,
                desc: field.descriptor,
            });
            self.pop_type();
            return;
        }

        if let Some(local) = local {
            self.emit_many(value);
            self.push_type(value_ty);
            self.convert_top_for(&local.ty);
            self.emit(Insn::Var { op: local.ty.store_op(), index: local.index });
            self.pop_type();
            return;
        }

        let owner = self.frame().class.clone();
        if let Some((desc, is_static, _)) = self.find_field(&owner, identifier) {
            let ty = JType::from_descriptor(&desc).unwrap_or(JType::any_object());
            if is_static {
                self.emit_many(value);
                self.push_type(value_ty);
                self.convert_top_for(&ty);
                self.emit(Insn::Field {
                    op: op::PUTSTATIC,
                    owner,
                    name: identifier.to_string(),
                    desc,
                });
                self.pop_type();
            } else {
                if self.current_method_is_static() {
                    let message = format!(
                        "Can't access instance field \"{}\" from static code",
                        identifier
                    );
                    self.error(&message);
                    return;
                }
                self.emit(Insn::Var { op: op::ALOAD, index: 0 });
                self.push_type(JType::object(owner.clone()));
                self.emit_many(value);
                self.push_type(value_ty);
                self.convert_top_for(&ty);
                self.emit(Insn::Field {
                    op: op::PUTFIELD,
                    owner,
                    name: identifier.to_string(),
                    desc,
                });
                self.pop_type();
                self.pop_type();
            }
            return;
        }

        let message = format!("Variable \"{}\" does not exist", identifier);
        self.error_at_current(&message);
    }

    fn compound_assign(&mut self, identifier: &str, local: Option<super::Local>, base: u8) {
        self.begin_capture();
        self.expression();
        self.flush_delayed();
        let value = self.end_capture();
        let Some(value_ty) = self.pop_type() else { return };

        if let Some(field) = self.find_inline_field(identifier) {
            let ty = JType::from_descriptor(&field.descriptor).unwrap_or(JType::any_object());
            if !ty.is_number() {
                self.error("Compound assignment needs a numeric target");
                return;
            }
            self.emit(Insn::Field {
                op: op::GETSTATIC,
                owner: field.owner.clone(),
                name: field.name.clone(),
                desc: field.descriptor.clone(),
            });
            self.push_type(ty.clone());
            self.emit_many(value);
            self.push_type(value_ty);
            self.convert_top_for(&ty);
            self.emit(Insn::Simple(ty.arith(base)));
            self.pop_type();
            self.pop_type();
            self.push_type(ty.clone());
            self.emit(Insn::Field {
                op: op::PUTSTATIC,
                owner: field.owner,
                name: field.name,
                desc: field.descriptor,
            });
            self.pop_type();
            return;
        }

        if let Some(local) = local {
            // int locals bump in place when the amount is a literal
            if local.ty == JType::Int && matches!(base, op::IADD | op::ISUB) {
                if let [Insn::Push(Const::Int(amount))] = value.as_slice() {
                    let delta = if base == op::ISUB { -amount } else { *amount };
                    if let Ok(delta) = i16::try_from(delta) {
                        self.emit(Insn::Iinc { index: local.index, delta });
                        return;
                    }
                }
            }
            if !local.ty.is_number() {
                self.error("Compound assignment needs a numeric target");
                return;
            }
            self.emit(Insn::Var { op: local.ty.load_op(), index: local.index });
            self.push_type(local.ty.clone());
            self.emit_many(value);
            self.push_type(value_ty);
            self.convert_top_for(&local.ty);
            self.emit(Insn::Simple(local.ty.arith(base)));
            self.pop_type();
            self.pop_type();
            self.push_type(local.ty.clone());
            self.emit(Insn::Var { op: local.ty.store_op(), index: local.index });
            self.pop_type();
            return;
        }

        let owner = self.frame().class.clone();
        if let Some((desc, is_static, _)) = self.find_field(&owner, identifier) {
            let ty = JType::from_descriptor(&desc).unwrap_or(JType::any_object());
            if !ty.is_number() {
                self.error("Compound assignment needs a numeric target");
                return;
            }
            if is_static {
                self.emit(Insn::Field {
                    op: op::GETSTATIC,
                    owner: owner.clone(),
                    name: identifier.to_string(),
                    desc: desc.clone(),
                });
                self.push_type(ty.clone());
                self.emit_many(value);
                self.push_type(value_ty);
                self.convert_top_for(&ty);
                self.emit(Insn::Simple(ty.arith(base)));
                self.pop_type();
                self.pop_type();
                self.push_type(ty.clone());
                self.emit(Insn::Field {
                    op: op::PUTSTATIC,
                    owner,
                    name: identifier.to_string(),
                    desc,
                });
                self.pop_type();
            } else {
                if self.current_method_is_static() {
                    let message = format!(
                        "Can't access instance field \"{}\" from static code",
                        identifier
                    );
                    self.error(&message);
                    return;
                }
                self.emit(Insn::Var { op: op::ALOAD, index: 0 });
                self.push_type(JType::object(owner.clone()));
                self.emit(Insn::Simple(op::DUP));
                self.push_type(JType::object(owner.clone()));
                self.emit(Insn::Field {
                    op: op::GETFIELD,
                    owner: owner.clone(),
                    name: identifier.to_string(),
                    desc: desc.clone(),
                });
                self.pop_type();
                self.push_type(ty.clone());
                self.emit_many(value);
                self.push_type(value_ty);
                self.convert_top_for(&ty);
                self.emit(Insn::Simple(ty.arith(base)));
                self.pop_type();
                self.pop_type();
                self.push_type(ty.clone());
                self.emit(Insn::Field {
                    op: op::PUTFIELD,
                    owner,
                    name: identifier.to_string(),
                    desc,
                });
                self.pop_type();
                self.pop_type();
            }
            return;
        }

        let message = format!("Variable \"{}\" does not exist", identifier);
        self.error_at_current(&message);
    }

    // ----- calls ----------------------------------------------------------

    fn call(&mut self) {
        if let Some(pending) = self.frame_mut().pending_call.take() {
            self.call_method(pending);
            return;
        }

        let Some(recv) = self.peek_top().cloned() else {
            self.error("Last stack is not an object!");
            return;
        };
        if !recv.is_pure_object() {
            self.error("Last stack is not an object!");
            return;
        }
        let args = self.captured_arguments();
        self.magic_invoke("call", &recv, args);
    }

    pub(crate) fn call_method(&mut self, pending: PendingCall) {
        match pending {
            PendingCall::Auto { owner, name } => {
                let args = self.captured_arguments();
                match self.resolve_callable(&owner, &name, args.len()) {
                    None => {
                        let message =
                            format!("Couldn't find any methods called \"{}\"!", name);
                        self.error(&message);
                    }
                    Some(resolved) if resolved.is_static => {
                        let params = parse_method_descriptor(&resolved.descriptor)
                            .map(|(p, _)| p);
                        self.replay_arguments(args, params.as_deref());
                        self.emit_invoke(&resolved, false);
                    }
                    Some(resolved) => {
                        if self.current_method_is_static() {
                            let message = format!(
                                "Can't call instance method \"{}\" from static code",
                                name
                            );
                            self.error(&message);
                            return;
                        }
                        self.emit(Insn::Var { op: op::ALOAD, index: 0 });
                        self.push_type(JType::object(owner));
                        let params = parse_method_descriptor(&resolved.descriptor)
                            .map(|(p, _)| p);
                        self.replay_arguments(args, params.as_deref());
                        self.emit_invoke(&resolved, true);
                    }
                }
            }
            PendingCall::Static { owner, name } => {
                let args = self.captured_arguments();
                match self.resolve_callable(&owner, &name, args.len()) {
                    Some(resolved) if resolved.is_static => {
                        let params = parse_method_descriptor(&resolved.descriptor)
                            .map(|(p, _)| p);
                        self.replay_arguments(args, params.as_deref());
                        self.emit_invoke(&resolved, false);
                    }
                    Some(_) => {
                        let message =
                            format!("\"{}\" is not a static method of {}", name, owner);
                        self.error(&message);
                    }
                    None => {
                        let message =
                            format!("Couldn't find any methods called \"{}\"!", name);
                        self.error(&message);
                    }
                }
            }
            PendingCall::Virtual { owner, name } => {
                let args = self.captured_arguments();
                match self.resolve_callable(&owner, &name, args.len()) {
                    Some(resolved) if !resolved.is_static => {
                        let params = parse_method_descriptor(&resolved.descriptor)
                            .map(|(p, _)| p);
                        self.replay_arguments(args, params.as_deref());
                        self.emit_invoke(&resolved, true);
                    }
                    Some(_) => {
                        let message =
                            format!("\"{}\" is a static method of {}", name, owner);
                        self.error(&message);
                    }
                    None => {
                        let message =
                            format!("Couldn't find any methods called \"{}\"!", name);
                        self.error(&message);
                    }
                }
            }
            PendingCall::Extension { owner, name, descriptor } => {
                let args = self.captured_arguments();
                let Some((params, ret)) = parse_method_descriptor(&descriptor) else {
                    self.error("Invalid extension method descriptor");
                    return;
                };
                // the receiver already on the stack is the first parameter
                if let Some(param) = params.first() {
                    self.convert_top_for(param);
                }
                self.replay_arguments(args, Some(&params[1..]));
                self.emit(Insn::Method {
                    op: op::INVOKESTATIC,
                    owner,
                    name,
                    desc: descriptor,
                    itf: false,
                });
                for _ in 0..params.len() {
                    self.pop_type();
                }
                self.push_type(ret);
            }
        }
    }

    pub(crate) fn call_inline(&mut self, identifier: &str) {
        let args = self.captured_arguments();
        let found = self
            .inline_methods
            .iter()
            .rev()
            .find(|m| {
                m.name == identifier
                    && super::types::descriptor_arity(&m.descriptor) == args.len()
            })
            .cloned();
        let Some(method) = found else {
            let message = format!("Couldn't find any methods called \"{}\"!", identifier);
            self.error(&message);
            return;
        };
        let Some((params, ret)) = parse_method_descriptor(&method.descriptor) else {
            self.error("Invalid inline method descriptor");
            return;
        };
        self.replay_arguments(args, Some(&params));
        self.emit(Insn::Method {
            op: op::INVOKESTATIC,
            owner: method.owner,
            name: method.name,
            desc: method.descriptor,
            itf: false,
        });
        for _ in 0..params.len() {
            self.pop_type();
        }
        self.push_type(ret);
    }

    fn magic_invoke(&mut self, name: &str, recv: &JType, args: Vec<(Vec<Insn>, JType)>) -> bool {
        let full = format!("{}{}", MAGIC_PREFIX, name);
        match self.resolve_callable(&recv.internal_name(), &full, args.len()) {
            Some(resolved) if !resolved.is_static => {
                let params = parse_method_descriptor(&resolved.descriptor).map(|(p, _)| p);
                self.replay_arguments(args, params.as_deref());
                self.emit_invoke(&resolved, true);
                true
            }
            _ => {
                let message = format!("Couldn't find any methods called \"{}\"!", full);
                self.error(&message);
                false
            }
        }
    }

    // ----- member access --------------------------------------------------

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name!");
        let name = self.parser.previous.lexeme.clone();

        if can_assign && self.match_kind(TokenKind::Equal) {
            self.dot_assign(&name);
        } else {
            self.dot_get(&name);
        }
    }

    fn dot_assign(&mut self, name: &str) {
        if let Some(class_lit) = self.frame_mut().pending_class.take() {
            let owner = class_lit.internal_name();
            self.expression();
            self.flush_delayed();

            if let Some((desc, is_static, _)) = self.find_field(&owner, name) {
                if !is_static {
                    let message = format!("Field \"{}\" of {} is not static", name, owner);
                    self.error(&message);
                    return;
                }
                let ty = JType::from_descriptor(&desc).unwrap_or(JType::any_object());
                self.convert_top_for(&ty);
                self.emit(Insn::Field {
                    op: op::PUTSTATIC,
                    owner,
                    name: name.to_string(),
                    desc,
                });
                self.pop_type();
            } else if let Some((mdesc, pdesc, _)) =
                self.find_property(&owner, name, PropertyKind::Set, true)
            {
                let ty = JType::from_descriptor(&pdesc).unwrap_or(JType::any_object());
                self.convert_top_for(&ty);
                self.emit(Insn::Method {
                    op: op::INVOKESTATIC,
                    owner,
                    name: name.to_string(),
                    desc: mdesc,
                    itf: false,
                });
                self.pop_type();
            } else {
                let message = format!("Couldn't find field \"{}\"!", name);
                self.error(&message);
            }
            return;
        }

        let Some(recv) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        let owner = recv.internal_name();
        self.expression();
        self.flush_delayed();

        if let Some((desc, is_static, _)) = self.find_field(&owner, name) {
            if is_static {
                let message =
                    format!("Field \"{}\" is static; assign through the class name", name);
                self.error(&message);
                return;
            }
            let ty = JType::from_descriptor(&desc).unwrap_or(JType::any_object());
            self.convert_top_for(&ty);
            self.emit(Insn::Field {
                op: op::PUTFIELD,
                owner,
                name: name.to_string(),
                desc,
            });
            self.pop_type();
            self.pop_type();
        } else if let Some((mdesc, pdesc, _)) =
            self.find_property(&owner, name, PropertyKind::Set, false)
        {
            let ty = JType::from_descriptor(&pdesc).unwrap_or(JType::any_object());
            self.convert_top_for(&ty);
            self.emit(Insn::Method {
                op: op::INVOKEVIRTUAL,
                owner,
                name: name.to_string(),
                desc: mdesc,
                itf: false,
            });
            self.pop_type();
            self.pop_type();
        } else {
            let message = format!("Couldn't find field \"{}\"!", name);
            self.error(&message);
        }
    }

    pub(crate) fn dot_get(&mut self, name: &str) {
        if !self.check(TokenKind::LeftParen) {
            // field or property read
            if let Some(class_lit) = self.frame_mut().pending_class.take() {
                let owner = class_lit.internal_name();
                if let Some((desc, is_static, nullable)) = self.find_field(&owner, name) {
                    if !is_static {
                        let message =
                            format!("Field \"{}\" of {} is not static", name, owner);
                        self.error(&message);
                        return;
                    }
                    let ty = JType::from_descriptor(&desc)
                        .unwrap_or(JType::any_object())
                        .with_nullable(nullable);
                    self.emit(Insn::Field {
                        op: op::GETSTATIC,
                        owner,
                        name: name.to_string(),
                        desc,
                    });
                    self.push_type(ty);
                } else if let Some((mdesc, pdesc, _)) =
                    self.find_property(&owner, name, PropertyKind::Get, true)
                {
                    self.emit(Insn::Method {
                        op: op::INVOKESTATIC,
                        owner,
                        name: name.to_string(),
                        desc: mdesc,
                        itf: false,
                    });
                    self.push_type(JType::from_descriptor(&pdesc).unwrap_or(JType::any_object()));
                } else {
                    let message = format!("Couldn't find field \"{}\"!", name);
                    self.error(&message);
                }
                return;
            }

            let Some(recv) = self.peek_top().cloned() else {
                self.error("Lost track of stack?");
                return;
            };
            let owner = recv.internal_name();
            if let Some((desc, is_static, nullable)) = self.find_field(&owner, name) {
                if is_static {
                    let message =
                        format!("Field \"{}\" is static; read through the class name", name);
                    self.error(&message);
                    return;
                }
                let ty = JType::from_descriptor(&desc)
                    .unwrap_or(JType::any_object())
                    .with_nullable(nullable);
                self.emit(Insn::Field {
                    op: op::GETFIELD,
                    owner,
                    name: name.to_string(),
                    desc,
                });
                self.pop_type();
                self.push_type(ty);
            } else if let Some((mdesc, pdesc, _)) =
                self.find_property(&owner, name, PropertyKind::Get, false)
            {
                self.emit(Insn::Method {
                    op: op::INVOKEVIRTUAL,
                    owner,
                    name: name.to_string(),
                    desc: mdesc,
                    itf: false,
                });
                self.pop_type();
                self.push_type(JType::from_descriptor(&pdesc).unwrap_or(JType::any_object()));
            } else {
                let message = format!("Couldn't find field \"{}\"!", name);
                self.error(&message);
            }
            return;
        }

        // method-call position: park the target until arguments are parsed
        if let Some(class_lit) = self.frame_mut().pending_class.take() {
            let owner = class_lit.internal_name();
            let extension = self
                .static_extensions
                .get(&owner)
                .and_then(|methods| methods.iter().find(|m| m.name == name))
                .cloned();
            self.frame_mut().pending_call = Some(match extension {
                Some(ext) => PendingCall::Static { owner: ext.owner, name: ext.name },
                None => PendingCall::Static { owner, name: name.to_string() },
            });
            return;
        }

        let Some(recv) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };
        let owner = recv.internal_name();
        let extension = self
            .extensions
            .get(&owner)
            .and_then(|methods| methods.iter().find(|m| m.name == name))
            .cloned();
        self.frame_mut().pending_call = Some(match extension {
            Some(ext) => PendingCall::Extension {
                owner: ext.owner,
                name: ext.name,
                descriptor: ext.descriptor,
            },
            None => PendingCall::Virtual { owner, name: name.to_string() },
        });
    }

    // ----- special forms --------------------------------------------------

    /// `Class:new(...)`, `value:subscript(...)`, `value:call(...)`
    fn special_dot(&mut self) {
        self.consume(TokenKind::Identifier, "Expected identifier after \":\"!");
        let content = self.parser.previous.lexeme.clone();
        let message = format!("Expected \"(\" after \"{}\"!", content);
        self.consume(TokenKind::LeftParen, &message);

        match content.as_str() {
            "new" => {
                let Some(class_lit) = self.frame_mut().pending_class.take() else {
                    self.error("Last stack is not a class!");
                    return;
                };
                let internal = class_lit.internal_name();
                let args = self.captured_arguments();

                self.emit(Insn::Type { op: op::NEW, name: internal.clone() });
                self.push_type(class_lit.clone());
                self.emit(Insn::Simple(op::DUP));
                self.push_type(class_lit.clone());

                let (params, descriptor) =
                    match self.resolve_callable(&internal, "<init>", args.len()) {
                        Some(resolved) => {
                            let params = parse_method_descriptor(&resolved.descriptor)
                                .map(|(p, _)| p)
                                .unwrap_or_default();
                            (params, resolved.descriptor)
                        }
                        None => {
                            let params: Vec<JType> =
                                args.iter().map(|(_, t)| t.clone()).collect();
                            let descriptor = method_descriptor(&params, &JType::Void);
                            (params, descriptor)
                        }
                    };

                self.replay_arguments(args, Some(&params));
                self.emit(Insn::Method {
                    op: op::INVOKESPECIAL,
                    owner: internal,
                    name: "<init>".to_string(),
                    desc: descriptor,
                    itf: false,
                });
                for _ in 0..params.len() {
                    self.pop_type();
                }
                self.pop_type(); // the duplicated reference the constructor consumed
            }
            "subscript" | "call" => {
                let Some(recv) = self.peek_top().cloned() else {
                    self.error("Last stack is not an object!");
                    return;
                };
                if !recv.is_pure_object() {
                    self.error("Last stack is not an object!");
                    return;
                }
                let args = self.captured_arguments();
                self.magic_invoke(&content, &recv, args);
            }
            _ => {
                let message = format!("Unknown special method \"{}\"", content);
                self.error(&message);
            }
        }
    }

    // ----- subscripts -----------------------------------------------------

    fn subscript(&mut self, can_assign: bool) {
        let Some(recv) = self.peek_top().cloned() else {
            self.error("Lost track of stack?");
            return;
        };

        self.expression();
        self.flush_delayed();

        let is_map =
            recv.is_pure_object() && self.is_subtype(&recv.internal_name(), "java/util/Map");
        if recv.is_array() {
            self.convert_top_to_int();
        } else if is_map || recv.is_pure_object() {
            self.convert_top_to_object();
        }
        self.consume(TokenKind::RightBracket, "Expect \"]\" after subscript");

        if recv.is_array() {
            let elem = recv.element_type().cloned().unwrap_or(JType::Int);
            self.subscript_array(can_assign, &elem);
        } else if is_map {
            self.subscript_map(can_assign);
        } else if recv.is_pure_object() {
            self.subscript_object(can_assign, &recv);
        } else {
            self.error("Can't subscript a primitive value");
        }
    }

    fn subscript_array(&mut self, can_assign: bool, elem: &JType) {
        if can_assign && self.match_kind(TokenKind::Equal) {
            self.expression();
            self.flush_delayed();
            self.convert_top_for(elem);
            self.emit(Insn::Simple(elem.array_store_op()));
            self.pop_type();
            self.pop_type();
            self.pop_type();
            return;
        }

        let base = if can_assign && self.match_kind(TokenKind::PlusEqual) {
            Some(op::IADD)
        } else if can_assign && self.match_kind(TokenKind::MinusEqual) {
            Some(op::ISUB)
        } else if can_assign && self.match_kind(TokenKind::StarEqual) {
            Some(op::IMUL)
        } else if can_assign && self.match_kind(TokenKind::SlashEqual) {
            Some(op::IDIV)
        } else {
            None
        };

        match base {
            Some(base) => {
                if !elem.is_number() {
                    self.error("Compound assignment needs a numeric element type");
                    return;
                }
                self.emit(Insn::Simple(op::DUP2));
                self.emit(Insn::Simple(elem.array_load_op()));
                self.push_type(elem.clone());
                self.expression();
                self.flush_delayed();
                self.convert_top_for(elem);
                self.emit(Insn::Simple(elem.arith(base)));
                self.pop_type();
                self.pop_type();
                self.push_type(elem.clone());
                self.emit(Insn::Simple(elem.array_store_op()));
                self.pop_type();
                self.pop_type();
                self.pop_type();
            }
            None => {
                self.emit(Insn::Simple(elem.array_load_op()));
                self.pop_type();
                self.replace_top(elem.clone());
            }
        }
    }

    fn subscript_map(&mut self, can_assign: bool) {
        if can_assign && self.match_kind(TokenKind::Equal) {
            self.expression();
            self.flush_delayed();
            self.convert_top_to_object();
            self.emit(Insn::Method {
                op: op::INVOKEINTERFACE,
                owner: "java/util/Map".to_string(),
                name: "put".to_string(),
                desc: "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;".to_string(),
                itf: true,
            });
            self.emit(Insn::Simple(op::POP));
            self.pop_type();
            self.pop_type();
            self.pop_type();
        } else {
            self.emit(Insn::Method {
                op: op::INVOKEINTERFACE,
                owner: "java/util/Map".to_string(),
                name: "get".to_string(),
                desc: "(Ljava/lang/Object;)Ljava/lang/Object;".to_string(),
                itf: true,
            });
            self.pop_type();
            self.replace_top(JType::nullable_object(OBJECT_CLASS));
        }
    }

    fn subscript_object(&mut self, can_assign: bool, recv: &JType) {
        let owner = recv.internal_name();
        if can_assign && self.match_kind(TokenKind::Equal) {
            self.expression();
            self.flush_delayed();
            self.convert_top_to_object();
            let name = format!("{}subscriptAssign", MAGIC_PREFIX);
            match self.resolve_callable(&owner, &name, 2) {
                Some(resolved) if !resolved.is_static => self.emit_invoke(&resolved, true),
                _ => {
                    let message = format!("Couldn't find any methods called \"{}\"!", name);
                    self.error(&message);
                }
            }
        } else {
            let name = format!("{}subscript", MAGIC_PREFIX);
            match self.resolve_callable(&owner, &name, 1) {
                Some(resolved) if !resolved.is_static => self.emit_invoke(&resolved, true),
                _ => {
                    let message = format!("Couldn't find any methods called \"{}\"!", name);
                    self.error(&message);
                }
            }
        }
    }

    // ----- collection and cast prefixes -----------------------------------

    /// Array literal: `[type: e1, e2, ...]`
    fn array_literal(&mut self) {
        let Some(elem) = self.parse_type("Expected array type after \"[\"") else {
            return;
        };
        let nullable = self.match_kind(TokenKind::Question);
        self.consume(TokenKind::Colon, "Expected \":\" after array type");

        self.begin_capture();
        let mut count: i32 = 0;
        if !self.check(TokenKind::RightBracket) {
            loop {
                self.emit_const(Const::Int(count));
                self.expression();
                self.flush_delayed();
                if !nullable && self.peek_top().map_or(false, |t| t.nullable()) {
                    self.error("Nullable value inside of non-nullable array!");
                }
                self.convert_top_for(&elem);
                self.pop_type();
                self.pop_type();
                self.raw_emit(Insn::Simple(elem.array_store_op()));
                self.raw_emit(Insn::Simple(op::DUP));
                count += 1;
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.raw_emit(Insn::Simple(op::POP));
        }
        let elements = self.end_capture();

        self.emit_const(Const::Int(count));
        match elem.newarray_atype() {
            Some(atype) => self.emit(Insn::NewArray { atype }),
            None => self.emit(Insn::Type { op: op::ANEWARRAY, name: elem.internal_name() }),
        }
        self.pop_type();
        self.push_type(JType::array_of(elem));
        if count > 0 {
            self.emit(Insn::Simple(op::DUP));
        }
        self.emit_many(elements);

        self.consume(TokenKind::RightBracket, "Expect \"]\" after expression");
    }

    /// Cast: `<Type>expr` / `<Type?>expr`
    fn cast(&mut self) {
        let Some(ty) = self.parse_type("Expected type name") else {
            return;
        };
        let nullable = self.match_kind(TokenKind::Question);
        self.consume(TokenKind::Greater, "Expected \">\" after type name");

        self.expression();
        self.flush_delayed();

        if !ty.is_pure_object() {
            self.convert_top_for(&ty);
            return;
        }
        self.emit(Insn::Type { op: op::CHECKCAST, name: ty.internal_name() });
        self.replace_top(ty.with_nullable(nullable));
    }

    // ----- imports and annotations ----------------------------------------

    fn import_declaration(&mut self) {
        if self.frame().scope != Scope::Top {
            self.error_at_current("You can only import in top-level code!");
            return;
        }

        let mut dotted = self.parse_identifier("Expect module after \"import\"");
        let mut simple = dotted.clone();
        while self.match_kind(TokenKind::Dot) {
            simple = self.parse_identifier("Expect name after \".\"");
            dotted.push('.');
            dotted.push_str(&simple);
        }

        let internal = dotted.replace('.', "/");
        let known = self.program.contains(&internal) || self.universe.class(&internal).is_some();
        if !known {
            let message = format!("\"{}\" is not a valid class!", dotted);
            self.error(&message);
            return;
        }

        self.import_members(&internal);
        self.imports.insert(simple, internal);
    }

    /// `@Name(key = literal, ...)` sequences, attached to the next element
    pub(crate) fn annotation(&mut self) {
        loop {
            let Some(ty) = self.parse_type("Expected annotation after \"@\"!") else {
                return;
            };
            let internal = ty.internal_name();
            if !self.program.contains(&internal) && !self.universe.exists(&internal) {
                self.error_at_current("Invalid annotation!");
            }

            let mut values = Vec::new();
            if self.match_kind(TokenKind::LeftParen) {
                if !self.check(TokenKind::RightParen) {
                    loop {
                        let key = self.parse_identifier("Expected key!");
                        let message = format!("Expected \"=\" after \"{}\"!", key);
                        self.consume(TokenKind::Equal, &message);

                        self.begin_capture();
                        self.expression();
                        self.flush_delayed();
                        let insns = self.end_capture();
                        self.pop_type();
                        match constant_value(&insns) {
                            Some(value) => values.push((key, value)),
                            None => self.error("Annotation values must be constant literals"),
                        }
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RightParen, "Expect \")\" after arguments");
            }

            self.pending_annotations.push(AnnotationDef {
                descriptor: format!("L{};", internal),
                values,
            });

            if !self.match_kind(TokenKind::At) {
                break;
            }
        }
    }
}
