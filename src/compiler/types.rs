//! Static type descriptors mirrored onto the compile-time operand stack

use crate::classfile::opcodes as op;

/// A JVM-level type as tracked by the compiler.
///
/// Nullability and light generic arguments ride along on object and array
/// types; they exist only at compile time and serialize into annotation
/// markers and signature strings.
#[derive(Debug, Clone, PartialEq)]
pub enum JType {
    Void,
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Float,
    Long,
    Double,
    Object {
        /// Internal name, e.g. `java/lang/String`
        name: String,
        nullable: bool,
        args: Vec<JType>,
    },
    Array {
        elem: Box<JType>,
        nullable: bool,
    },
}

pub const OBJECT_CLASS: &str = "java/lang/Object";
pub const STRING_CLASS: &str = "java/lang/String";

impl JType {
    pub fn object(name: impl Into<String>) -> JType {
        JType::Object {
            name: name.into(),
            nullable: false,
            args: Vec::new(),
        }
    }

    pub fn nullable_object(name: impl Into<String>) -> JType {
        JType::Object {
            name: name.into(),
            nullable: true,
            args: Vec::new(),
        }
    }

    pub fn array_of(elem: JType) -> JType {
        JType::Array {
            elem: Box::new(elem),
            nullable: false,
        }
    }

    pub fn string() -> JType {
        JType::object(STRING_CLASS)
    }

    pub fn any_object() -> JType {
        JType::object(OBJECT_CLASS)
    }

    /// Map a source-level class name (primitive keyword, dotted or internal
    /// qualified name) onto a type descriptor.
    pub fn from_class_name(name: &str) -> JType {
        match name {
            "void" => JType::Void,
            "boolean" => JType::Boolean,
            "char" => JType::Char,
            "byte" => JType::Byte,
            "short" => JType::Short,
            "int" => JType::Int,
            "float" => JType::Float,
            "long" => JType::Long,
            "double" => JType::Double,
            _ => JType::object(name.replace('.', "/")),
        }
    }

    /// Parse a single JVM field descriptor
    pub fn from_descriptor(desc: &str) -> Option<JType> {
        let mut chars = desc.chars();
        let ty = parse_descriptor(&mut chars)?;
        chars.next().is_none().then_some(ty)
    }

    pub fn descriptor(&self) -> String {
        match self {
            JType::Void => "V".to_string(),
            JType::Boolean => "Z".to_string(),
            JType::Char => "C".to_string(),
            JType::Byte => "B".to_string(),
            JType::Short => "S".to_string(),
            JType::Int => "I".to_string(),
            JType::Float => "F".to_string(),
            JType::Long => "J".to_string(),
            JType::Double => "D".to_string(),
            JType::Object { name, .. } => format!("L{};", name),
            JType::Array { elem, .. } => format!("[{}", elem.descriptor()),
        }
    }

    /// Internal name as used by `new`/`checkcast`/`anewarray`: the bare
    /// qualified name for objects, the full descriptor for arrays.
    pub fn internal_name(&self) -> String {
        match self {
            JType::Object { name, .. } => name.clone(),
            JType::Array { .. } => self.descriptor(),
            other => other.descriptor(),
        }
    }

    /// Generic signature string, present only when type arguments were
    /// declared (`List<String>` and friends).
    pub fn signature(&self) -> Option<String> {
        match self {
            JType::Object { name, args, .. } if !args.is_empty() => {
                let inner: String = args.iter().map(|a| a.descriptor()).collect();
                Some(format!("L{}<{}>;", name, inner))
            }
            _ => None,
        }
    }

    /// Slot/stack width: 2 for long and double, 1 otherwise
    pub fn size(&self) -> u16 {
        match self {
            JType::Long | JType::Double => 2,
            JType::Void => 0,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.size() == 2
    }

    /// Types that live in int slots on the operand stack
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JType::Boolean | JType::Char | JType::Byte | JType::Short | JType::Int
        )
    }

    pub fn is_number(&self) -> bool {
        self.is_int_like() || matches!(self, JType::Float | JType::Long | JType::Double)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JType::Object { .. } | JType::Array { .. })
    }

    pub fn is_pure_object(&self) -> bool {
        matches!(self, JType::Object { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, JType::Array { .. })
    }

    pub fn is_string(&self) -> bool {
        matches!(self, JType::Object { name, .. } if name == STRING_CLASS)
    }

    pub fn nullable(&self) -> bool {
        match self {
            JType::Object { nullable, .. } | JType::Array { nullable, .. } => *nullable,
            _ => false,
        }
    }

    pub fn with_nullable(mut self, value: bool) -> JType {
        match &mut self {
            JType::Object { nullable, .. } | JType::Array { nullable, .. } => *nullable = value,
            _ => {}
        }
        self
    }

    pub fn with_args(mut self, type_args: Vec<JType>) -> JType {
        if let JType::Object { args, .. } = &mut self {
            *args = type_args;
        }
        self
    }

    pub fn type_args(&self) -> &[JType] {
        match self {
            JType::Object { args, .. } => args,
            _ => &[],
        }
    }

    pub fn element_type(&self) -> Option<&JType> {
        match self {
            JType::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Same underlying type, ignoring nullability and generic arguments
    pub fn same_base(&self, other: &JType) -> bool {
        match (self, other) {
            (JType::Object { name: a, .. }, JType::Object { name: b, .. }) => a == b,
            (JType::Array { elem: a, .. }, JType::Array { elem: b, .. }) => a.same_base(b),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    /// Offset into the I/L/F/D(/A) opcode families
    fn kind_offset(&self) -> u8 {
        match self {
            t if t.is_int_like() => 0,
            JType::Long => 1,
            JType::Float => 2,
            JType::Double => 3,
            _ => 4,
        }
    }

    pub fn load_op(&self) -> u8 {
        op::ILOAD + self.kind_offset()
    }

    pub fn store_op(&self) -> u8 {
        op::ISTORE + self.kind_offset()
    }

    pub fn return_op(&self) -> u8 {
        match self {
            JType::Void => op::RETURN,
            _ => op::IRETURN + self.kind_offset(),
        }
    }

    /// Arithmetic family member, e.g. `arith(IADD)` yields `dadd` for doubles
    pub fn arith(&self, base: u8) -> u8 {
        base + self.kind_offset()
    }

    pub fn array_load_op(&self) -> u8 {
        match self {
            JType::Byte | JType::Boolean => op::BALOAD,
            JType::Char => op::CALOAD,
            JType::Short => op::SALOAD,
            JType::Int => op::IALOAD,
            JType::Long => op::LALOAD,
            JType::Float => op::FALOAD,
            JType::Double => op::DALOAD,
            _ => op::AALOAD,
        }
    }

    pub fn array_store_op(&self) -> u8 {
        self.array_load_op() + (op::IASTORE - op::IALOAD)
    }

    /// `newarray` type operand for primitive element types
    pub fn newarray_atype(&self) -> Option<u8> {
        match self {
            JType::Boolean => Some(4),
            JType::Char => Some(5),
            JType::Float => Some(6),
            JType::Double => Some(7),
            JType::Byte => Some(8),
            JType::Short => Some(9),
            JType::Int => Some(10),
            JType::Long => Some(11),
            _ => None,
        }
    }

    /// Boxed counterpart of a primitive, if any
    pub fn boxed_class(&self) -> Option<&'static str> {
        match self {
            JType::Boolean => Some("java/lang/Boolean"),
            JType::Int => Some("java/lang/Integer"),
            JType::Float => Some("java/lang/Float"),
            JType::Long => Some("java/lang/Long"),
            JType::Double => Some("java/lang/Double"),
            _ => None,
        }
    }
}

fn parse_descriptor(chars: &mut std::str::Chars<'_>) -> Option<JType> {
    match chars.next()? {
        'V' => Some(JType::Void),
        'Z' => Some(JType::Boolean),
        'C' => Some(JType::Char),
        'B' => Some(JType::Byte),
        'S' => Some(JType::Short),
        'I' => Some(JType::Int),
        'F' => Some(JType::Float),
        'J' => Some(JType::Long),
        'D' => Some(JType::Double),
        'L' => {
            let mut name = String::new();
            loop {
                match chars.next()? {
                    ';' => break,
                    c => name.push(c),
                }
            }
            Some(JType::object(name))
        }
        '[' => Some(JType::array_of(parse_descriptor(chars)?)),
        _ => None,
    }
}

/// Build a `(params)ret` method descriptor
pub fn method_descriptor(params: &[JType], ret: &JType) -> String {
    let mut d = String::from("(");
    for p in params {
        d.push_str(&p.descriptor());
    }
    d.push(')');
    d.push_str(&ret.descriptor());
    d
}

/// Split a method descriptor into parameter types and return type
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JType>, JType)> {
    let inner = desc.strip_prefix('(')?;
    let close = inner.find(')')?;
    let (params_str, ret_str) = (&inner[..close], &inner[close + 1..]);

    let mut params = Vec::new();
    let mut chars = params_str.chars();
    loop {
        let rest = chars.as_str();
        if rest.is_empty() {
            break;
        }
        params.push(parse_descriptor(&mut chars)?);
    }
    Some((params, JType::from_descriptor(ret_str)?))
}

/// Number of argument slots a method descriptor consumes
pub fn descriptor_arity(desc: &str) -> usize {
    parse_method_descriptor(desc).map(|(p, _)| p.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trip() {
        for desc in ["I", "J", "D", "Ljava/lang/String;", "[I", "[[Ljava/lang/Object;"] {
            let ty = JType::from_descriptor(desc).expect(desc);
            assert_eq!(ty.descriptor(), desc);
        }
    }

    #[test]
    fn method_descriptor_round_trip() {
        let params = vec![JType::Int, JType::array_of(JType::string()), JType::Double];
        let desc = method_descriptor(&params, &JType::Long);
        assert_eq!(desc, "(I[Ljava/lang/String;D)J");
        let (parsed, ret) = parse_method_descriptor(&desc).unwrap();
        assert_eq!(parsed, params);
        assert_eq!(ret, JType::Long);
    }

    #[test]
    fn wide_types_take_two_slots() {
        assert_eq!(JType::Long.size(), 2);
        assert_eq!(JType::Double.size(), 2);
        assert_eq!(JType::Int.size(), 1);
        assert_eq!(JType::string().size(), 1);
    }

    #[test]
    fn opcode_families() {
        use crate::classfile::opcodes as op;
        assert_eq!(JType::Int.load_op(), op::ILOAD);
        assert_eq!(JType::Double.load_op(), op::DLOAD);
        assert_eq!(JType::string().load_op(), op::ALOAD);
        assert_eq!(JType::Long.arith(op::IADD), op::LADD);
        assert_eq!(JType::Double.return_op(), op::DRETURN);
        assert_eq!(JType::Void.return_op(), op::RETURN);
    }

    #[test]
    fn nullability_is_not_part_of_the_base_type() {
        let a = JType::string();
        let b = JType::string().with_nullable(true);
        assert!(a.same_base(&b));
        assert!(b.nullable() && !a.nullable());
    }

    #[test]
    fn signatures_only_for_generic_types() {
        let plain = JType::object("java/util/List");
        assert_eq!(plain.signature(), None);
        let generic = JType::object("java/util/List").with_args(vec![JType::string()]);
        assert_eq!(
            generic.signature().as_deref(),
            Some("Ljava/util/List<Ljava/lang/String;>;")
        );
    }
}
