use crate::parser::RustParser;
use crate::parser::tests::fixtures::*;
use std::path::Path;

#[test]
fn test_controller_methods() {
    let mut parser = RustParser::new().expect("Failed to create parser");
    let result = parser
        .parse_source(HELLO_CONTROLLER, Path::new("src/controller.rs"), "demo")
        .unwrap();

    assert_eq!(result.impls.len(), 1);
    let controller_impl = &result.impls[0];
    assert_eq!(controller_impl.self_type, "HelloController");
    assert!(controller_impl.trait_name.is_none());

    let names: Vec<_> = controller_impl.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["hello", "post_hello", "put_hello"]);

    let hello = &controller_impl.methods[0];
    assert!(hello.parameters.is_empty(), "receiver is not a parameter");
    assert_eq!(hello.return_type.as_deref(), Some("HashMap<String, String>"));
    assert_eq!(hello.attributes[0].text, "#[get_mapping]");

    let put = &controller_impl.methods[2];
    let types: Vec<_> = put.parameters.iter().map(|p| p.param_type.as_str()).collect();
    assert_eq!(types, vec!["String", "Map<String, Value>"]);
    assert_eq!(put.parameters[0].name, "id");
    assert_eq!(put.attributes[0].text, "#[put_mapping(\"/{id}\")]");
    assert_eq!(put.attributes[0].name(), "put_mapping");
}

#[test]
fn test_impl_forms() {
    let mut parser = RustParser::new().expect("Failed to create parser");
    let result = parser
        .parse_source(IMPL_FORMS, Path::new("src/cache.rs"), "store")
        .unwrap();

    // the impl for `&'a Cache<String>` has no nameable self type
    assert_eq!(result.impls.len(), 3);

    let inherent = &result.impls[0];
    assert_eq!(inherent.self_type, "Cache");
    assert_eq!(inherent.module_path, "store::cache");
    assert_eq!(inherent.methods.len(), 2);

    let boxed = &inherent.methods[1];
    assert_eq!(boxed.name, "boxed");
    assert_eq!(boxed.visibility, "private");
    assert!(boxed.return_type.is_none());
    let types: Vec<_> = boxed.parameters.iter().map(|p| p.param_type.as_str()).collect();
    assert_eq!(types, vec!["u8"], "`self: Box<Self>` is a receiver");

    let display = &result.impls[1];
    assert_eq!(display.self_type, "Cache");
    assert_eq!(display.trait_name.as_deref(), Some("fmt::Display"));
    assert_eq!(display.methods[0].parameters[0].param_type, "&mut fmt::Formatter<'_>");

    let scoped = &result.impls[2];
    assert_eq!(scoped.self_type, "crate::model::Order");
    assert_eq!(scoped.methods[0].name, "total");
}
