//! Standard type-universe fixture
//!
//! The host classes every compilation can rely on: the java/lang core the
//! emitter targets for conversions and operators, and `basalt/lang/Std`,
//! whose inline members are auto-imported into every unit.

use once_cell::sync::Lazy;

use super::{ClassDesc, HostUniverse};

/// Internal name of the auto-imported standard-library class
pub const STD_CLASS: &str = "basalt/lang/Std";

static STANDARD: Lazy<HostUniverse> = Lazy::new(build_standard);

/// The shared standard universe
pub fn standard_universe() -> &'static HostUniverse {
    &STANDARD
}

fn build_standard() -> HostUniverse {
    let mut universe = HostUniverse::new();

    let mut object = ClassDesc::new("java/lang/Object")
        .method("equals", "(Ljava/lang/Object;)Z")
        .method("hashCode", "()I")
        .method("toString", "()Ljava/lang/String;");
    object.super_name = None;
    universe.insert(object);

    universe.insert(
        ClassDesc::new("java/lang/String")
            .method("concat", "(Ljava/lang/String;)Ljava/lang/String;")
            .method("length", "()I")
            .method("isEmpty", "()Z")
            .method("charAt", "(I)C")
            .method("substring", "(II)Ljava/lang/String;")
            .method("contains", "(Ljava/lang/CharSequence;)Z"),
    );

    universe.insert(
        ClassDesc::new("java/lang/Integer")
            .static_method("valueOf", "(I)Ljava/lang/Integer;")
            .static_method("parseInt", "(Ljava/lang/String;)I")
            .method("intValue", "()I")
            .static_field("MAX_VALUE", "I")
            .static_field("MIN_VALUE", "I"),
    );
    universe.insert(
        ClassDesc::new("java/lang/Long")
            .static_method("valueOf", "(J)Ljava/lang/Long;")
            .static_method("parseLong", "(Ljava/lang/String;)J")
            .method("longValue", "()J")
            .static_field("MAX_VALUE", "J")
            .static_field("MIN_VALUE", "J"),
    );
    universe.insert(
        ClassDesc::new("java/lang/Float")
            .static_method("valueOf", "(F)Ljava/lang/Float;")
            .static_method("parseFloat", "(Ljava/lang/String;)F")
            .method("floatValue", "()F"),
    );
    universe.insert(
        ClassDesc::new("java/lang/Double")
            .static_method("valueOf", "(D)Ljava/lang/Double;")
            .static_method("parseDouble", "(Ljava/lang/String;)D")
            .method("doubleValue", "()D"),
    );
    universe.insert(
        ClassDesc::new("java/lang/Boolean")
            .static_method("valueOf", "(Z)Ljava/lang/Boolean;")
            .static_method("parseBoolean", "(Ljava/lang/String;)Z")
            .static_method("compare", "(ZZ)I")
            .method("booleanValue", "()Z"),
    );

    universe.insert(
        ClassDesc::new("java/lang/System")
            .static_field("out", "Ljava/io/PrintStream;")
            .static_method("exit", "(I)V")
            .static_method("currentTimeMillis", "()J"),
    );
    universe.insert(
        ClassDesc::new("java/io/PrintStream")
            .method("println", "()V")
            .method("println", "(Ljava/lang/String;)V")
            .method("print", "(Ljava/lang/String;)V"),
    );
    universe.insert(
        ClassDesc::new("java/lang/StringBuilder")
            .method("<init>", "()V")
            .method("append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
            .method("toString", "()Ljava/lang/String;"),
    );
    universe.insert(ClassDesc::new("java/lang/AssertionError").method("<init>", "()V"));
    universe.insert(ClassDesc::interface("java/lang/CharSequence"));

    universe.insert(
        ClassDesc::interface("java/lang/Iterable").method("iterator", "()Ljava/util/Iterator;"),
    );
    universe.insert(
        ClassDesc::interface("java/util/Iterator")
            .method("hasNext", "()Z")
            .method("next", "()Ljava/lang/Object;"),
    );
    universe.insert(
        ClassDesc::interface("java/util/Collection")
            .implementing("java/lang/Iterable")
            .method("size", "()I"),
    );
    universe.insert(
        ClassDesc::interface("java/util/List")
            .implementing("java/util/Collection")
            .method("get", "(I)Ljava/lang/Object;"),
    );
    universe.insert(
        ClassDesc::interface("java/util/Map")
            .method("get", "(Ljava/lang/Object;)Ljava/lang/Object;")
            .method(
                "put",
                "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
            ),
    );

    universe.insert(
        ClassDesc::new(STD_CLASS)
            .inline_method("println", "(Ljava/lang/String;)V")
            .inline_method("print", "(Ljava/lang/String;)V")
            .inline_method("assertThat", "(Z)V")
            .inline_method("assertThat", "(ZLjava/lang/String;)V")
            .inline_method("exit", "()V")
            .inline_method("exit", "(I)V")
            .inline_method("toString", "(Ljava/lang/Object;)Ljava/lang/String;")
            .inline_method("arrayToString", "(Ljava/lang/Object;)Ljava/lang/String;"),
    );

    universe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::TypeUniverse;

    #[test]
    fn std_members_are_inline_statics() {
        let std = standard_universe().class(STD_CLASS).unwrap();
        let println = std.find_method("println", 1).unwrap();
        assert!(println.inline && println.is_static);
        let assert2 = std.find_method("assertThat", 2).unwrap();
        assert_eq!(assert2.descriptor, "(ZLjava/lang/String;)V");
    }

    #[test]
    fn core_classes_resolve() {
        let universe = standard_universe();
        assert!(universe.class("java/lang/String").is_some());
        assert!(universe.class("java/lang/Integer").is_some());
        assert!(super::super::is_subtype_of(
            universe,
            "java/util/List",
            "java/lang/Iterable"
        ));
    }
}
