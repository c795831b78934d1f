//! Type registry tests - declarations, naming, member lookup, extensions

use std::collections::HashMap;

use maplit::hashmap;

use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Door {
    width: i64,
    is_locked: bool,
    label: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Texture {
    path: String,
    scale: i64,
}

fn door_decl() -> TypeDecl {
    TypeDecl::aggregate("Door")
        .member("width", TypeRef::Int)
        .member("isLocked", TypeRef::Bool)
        .member_as("label", "caption", TypeRef::String)
        .constructor(|args| {
            Ok(Door {
                width: args.int("width")?,
                is_locked: args.bool("is_locked")?,
                label: args.string("caption")?,
            })
        })
}

fn texture_decl() -> TypeDecl {
    TypeDecl::adapter_for(|args: &Arguments| {
        let path = args.string("path")?;
        if path.is_empty() {
            return Err(HostError::failed("empty texture path"));
        }
        Ok(Texture { path, scale: 1 })
    })
    .member("path", TypeRef::String)
}

fn scale_property() -> ExtensionPropertyDecl {
    ExtensionPropertyDecl::new("Texture", "scale", TypeRef::Int, |t: &Texture| {
        Value::Int(t.scale)
    })
    .setter(|t: &mut Texture, value: Value| {
        t.scale = value
            .as_int()
            .ok_or_else(|| HostError::failed("scale must be an int"))?;
        Ok(())
    })
}

fn build(builder: RegistryBuilder) -> Registry {
    builder.build().expect("Registry should build")
}

fn member_names(registry: &Registry, type_name: &str) -> Vec<String> {
    registry
        .aggregate(type_name)
        .expect("aggregate should exist")
        .members
        .iter()
        .map(|m| m.name.clone())
        .collect()
}

/* ===================== Naming ===================== */

#[test]
fn test_convert_to_dsl_name() {
    let cases = hashmap! {
        "DungeonConfig" => "dungeon_config",
        "correctAnswerIndex" => "correct_answer_index",
        "already_snake" => "already_snake",
        "Quiz" => "quiz",
        "HTTPServer" => "httpserver",
        "level2Boss" => "level2_boss",
    };
    for (input, expected) in cases {
        assert_eq!(convert_to_dsl_name(input), expected, "converting {}", input);
    }
}

#[test]
fn test_short_type_name() {
    assert_eq!(short_type_name::<Texture>(), "Texture");
    assert_eq!(short_type_name::<Vec<String>>(), "Vec");
}

#[test]
fn test_collection_type_names() {
    assert_eq!(DslType::list(DslType::INT).name(), "int[]");
    assert_eq!(DslType::set(DslType::STRING).name(), "string<>");
    assert_eq!(DslType::map(DslType::STRING, DslType::INT).name(), "[string -> int]");
    assert_eq!(
        DslType::Function(Box::new(FunctionType::new(vec![DslType::STRING], DslType::NONE))).name(),
        "fn(string) -> none"
    );
}

#[test]
fn test_collection_assignability() {
    let expected = DslType::list(DslType::Aggregate("door".into()));
    assert!(expected.is_assignable_from(&DslType::list(DslType::Aggregate("door".into()))));
    assert!(!expected.is_assignable_from(&DslType::set(DslType::Aggregate("door".into()))));
    assert!(!DslType::INT.is_assignable_from(&DslType::FLOAT));
}

/* ===================== Aggregates ===================== */

#[test]
fn test_aggregate_members_follow_declaration() {
    let registry = build(Registry::builder().register_type(door_decl()));

    let door = registry.aggregate("door").expect("door registered");
    assert_eq!(door.host_name, "Door");
    assert!(!door.is_adapted());
    assert_eq!(door.members.len(), 3);
    assert_eq!(member_names(&registry, "door"), vec!["width", "is_locked", "caption"]);
    assert_eq!(door.members[2].host_ident, "label");
    assert_eq!(registry.lookup_type("door"), Some(DslType::Aggregate("door".into())));
}

#[test]
fn test_rebuild_is_deterministic() {
    let first = build(Registry::builder().register_type(door_decl()).register_type(texture_decl()));
    let second = build(Registry::builder().register_type(door_decl()).register_type(texture_decl()));

    let names = |r: &Registry| r.types().map(|t| t.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names(&first), names(&second));
    assert_eq!(member_names(&first, "door"), member_names(&second, "door"));
}

#[test]
fn test_type_name_override() {
    let registry = build(Registry::builder().register_type(door_decl().named("portal")));
    assert!(registry.get("door").is_none());
    assert!(registry.aggregate("portal").is_some());
}

#[test]
fn test_constructor_receives_named_arguments() {
    let registry = build(Registry::builder().register_type(door_decl()));
    let door = registry.aggregate("door").unwrap();

    let args = Arguments::new(vec![
        ("width".into(), Value::Int(2)),
        ("is_locked".into(), Value::Bool(true)),
        ("caption".into(), Value::from("north")),
    ]);
    let host = door.build(&args).expect("constructor should succeed");
    assert_eq!(
        host.downcast_clone::<Door>(),
        Some(Door {
            width: 2,
            is_locked: true,
            label: "north".into()
        })
    );
}

#[test]
fn test_absent_argument_is_missing_value() {
    let args = Arguments::new(vec![("texture".into(), Value::Absent)]);
    assert_eq!(
        args.get("texture").unwrap_err(),
        HostError::MissingValue {
            member: "texture".into()
        }
    );
    assert!(args.optional("texture").is_none());
}

/* ===================== Build Errors ===================== */

#[test]
fn test_duplicate_member_aborts_build() {
    let decl = TypeDecl::aggregate("Door")
        .member("width", TypeRef::Int)
        .member_as("height", "width", TypeRef::Int)
        .constructor(|_| Ok(()));
    let err = Registry::builder().register_type(decl).build().unwrap_err();
    assert_eq!(
        err,
        TypeBuildError::DuplicateMember {
            type_name: "door".into(),
            member: "width".into()
        }
    );
}

#[test]
fn test_unresolved_member_type_aborts_build() {
    let decl = TypeDecl::aggregate("Room")
        .member("door", TypeRef::named("Portal"))
        .constructor(|_| Ok(()));
    let err = Registry::builder().register_type(decl).build().unwrap_err();
    assert!(matches!(err, TypeBuildError::UnresolvedType { ref reference, .. } if reference == "Portal"));
}

#[test]
fn test_duplicate_type_aborts_build() {
    let err = Registry::builder()
        .register_type(door_decl())
        .register_type(door_decl())
        .build()
        .unwrap_err();
    assert_eq!(err, TypeBuildError::DuplicateType { name: "door".into() });
}

#[test]
fn test_missing_builder_aborts_build() {
    let decl = TypeDecl::aggregate("Door").member("width", TypeRef::Int);
    let err = Registry::builder().register_type(decl).build().unwrap_err();
    assert_eq!(err, TypeBuildError::MissingBuilder { type_name: "door".into() });
}

#[test]
fn test_forward_references_between_types() {
    let room = TypeDecl::aggregate("Room")
        .member("doors", TypeRef::list(TypeRef::of::<Door>()))
        .constructor(|_| Ok(()));
    let registry = build(Registry::builder().register_type(room).register_type(door_decl()));

    let room = registry.aggregate("room").unwrap();
    assert_eq!(room.members[0].ty, DslType::list(DslType::Aggregate("door".into())));
    assert_eq!(registry.collection_types(), &[DslType::list(DslType::Aggregate("door".into()))]);
}

#[test]
fn test_ambiguous_host_reference() {
    let a = TypeDecl::adapted("Quiz").named("single").adapter(|_| Ok(()));
    let b = TypeDecl::adapted("Quiz").named("multiple").adapter(|_| Ok(()));
    let holder = TypeDecl::aggregate("Holder")
        .member("quiz", TypeRef::named("Quiz"))
        .constructor(|_| Ok(()));
    let err = Registry::builder()
        .register_type(a)
        .register_type(b)
        .register_type(holder)
        .build()
        .unwrap_err();
    assert!(matches!(err, TypeBuildError::AmbiguousType { ref candidates, .. } if candidates.len() == 2));
}

/* ===================== Enums ===================== */

#[test]
fn test_enum_variants_keep_order() {
    let registry = build(
        Registry::builder().register_enum(EnumDecl::new("Difficulty", ["Easy", "Normal", "VeryHard"])),
    );
    let difficulty = registry.enum_type("difficulty").expect("enum registered");
    assert_eq!(difficulty.variants, vec!["easy", "normal", "very_hard"]);
    assert_eq!(registry.lookup_type("difficulty"), Some(DslType::Enum("difficulty".into())));
}

/* ===================== Extensions ===================== */

#[test]
fn test_adapter_round_trip_through_extension() {
    let registry = build(
        Registry::builder()
            .register_extension_property(scale_property())
            .register_extension_property(ExtensionPropertyDecl::new(
                "Texture",
                "path",
                TypeRef::String,
                |t: &Texture| Value::from(t.path.clone()),
            ))
            .register_type(texture_decl()),
    );

    let texture = registry.aggregate("texture").expect("adapter registered");
    assert!(texture.is_adapted());
    assert_eq!(texture.dsl_type(), DslType::AggregateAdapted("texture".into()));

    let host = texture
        .build(&Arguments::new(vec![("path".into(), Value::from("walls/stone.png"))]))
        .expect("adapter should succeed");

    // Declared member wins over the extension with the same name
    let path = registry.resolve_member(&texture.dsl_type(), "path").unwrap();
    assert!(matches!(path, MemberLookup::Field(0, _)));

    let path = registry.extension("Texture", "path").unwrap();
    assert_eq!(path.get(&host).unwrap(), Value::from("walls/stone.png"));

    let scale = match registry.resolve_member(&texture.dsl_type(), "scale") {
        Some(MemberLookup::Extension(ext)) => ext,
        other => panic!("Expected extension, got {:?}", other),
    };
    assert_eq!(scale.get(&host).unwrap(), Value::Int(1));
    scale.set(&host, Value::Int(4)).unwrap();
    assert_eq!(scale.get(&host).unwrap(), Value::Int(4));
}

#[test]
fn test_adapter_failure_is_reported() {
    let registry = build(Registry::builder().register_type(texture_decl()));
    let texture = registry.aggregate("texture").unwrap();
    let err = texture
        .build(&Arguments::new(vec![("path".into(), Value::from(""))]))
        .unwrap_err();
    assert_eq!(err, HostError::failed("empty texture path"));
}

#[test]
fn test_read_only_extension_rejects_write() {
    let registry = build(
        Registry::builder()
            .register_type(texture_decl())
            .register_extension_property(ExtensionPropertyDecl::new(
                "texture",
                "file",
                TypeRef::String,
                |t: &Texture| Value::from(t.path.clone()),
            )),
    );
    let file = registry.extension("Texture", "file").expect("target by DSL name");
    assert!(!file.is_writable());

    let host = HostObject::new(Texture {
        path: "a.png".into(),
        scale: 1,
    });
    assert!(file.set(&host, Value::from("b.png")).is_err());
}

#[test]
fn test_extension_target_must_exist() {
    let err = Registry::builder()
        .register_extension_property(scale_property())
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        TypeBuildError::UnknownExtensionTarget {
            target: "Texture".into(),
            name: "scale".into()
        }
    );
}

#[test]
fn test_duplicate_extension_aborts_build() {
    let err = Registry::builder()
        .register_type(texture_decl())
        .register_extension_property(scale_property())
        .register_extension_property(scale_property())
        .build()
        .unwrap_err();
    assert!(matches!(err, TypeBuildError::DuplicateExtension { .. }));
}

#[test]
fn test_extension_method_dispatch() {
    let registry = build(
        Registry::builder()
            .register_type(texture_decl())
            .register_extension_method(ExtensionMethodDecl::new(
                "Texture",
                "scaled",
                vec![TypeRef::Int],
                TypeRef::Int,
                |t: &mut Texture, args: &[Value]| {
                    let factor = args.first().and_then(Value::as_int).unwrap_or(1);
                    t.scale *= factor;
                    Ok(Value::Int(t.scale))
                },
            )),
    );

    let ty = DslType::AggregateAdapted("texture".into());
    let method = registry.method(&ty, "scaled").expect("method registered");
    assert_eq!(method.signature.params, vec![DslType::INT]);

    let host = HostObject::new(Texture {
        path: "a.png".into(),
        scale: 2,
    });
    assert_eq!((method.call)(&host, &[Value::Int(3)]).unwrap(), Value::Int(6));
    assert_eq!(host.downcast_clone::<Texture>().unwrap().scale, 6);
}

#[test]
fn test_functions_resolve_signatures() {
    let registry = build(Registry::builder().register_function(FunctionDecl::new(
        "count",
        vec![TypeRef::list(TypeRef::String)],
        TypeRef::Int,
        |args: &[Value]| {
            let n = args.first().and_then(Value::as_elements).map(|e| e.len()).unwrap_or(0);
            Ok(Value::Int(n as i64))
        },
    )));

    let count = registry.function("count").expect("function registered");
    assert_eq!(count.dsl_type().name(), "fn(string[]) -> int");
    let result = (count.call)(&[Value::List(vec![Value::from("a"), Value::from("b")])]).unwrap();
    assert_eq!(result, Value::Int(2));
}

#[test]
fn test_registry_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Registry>();
}

/* ===================== Values ===================== */

#[test]
fn test_set_and_map_values_are_unordered() {
    let a = Value::set_from(vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
    let b = Value::set_from(vec![Value::Int(2), Value::Int(1)]);
    assert_eq!(a, b);
    assert_eq!(a.as_elements().map(<[Value]>::len), Some(2));

    let expected: HashMap<&str, i64> = hashmap! { "a" => 3, "b" => 2 };
    let map = Value::map_from(vec![
        (Value::from("a"), Value::Int(1)),
        (Value::from("b"), Value::Int(2)),
        (Value::from("a"), Value::Int(3)),
    ]);
    let Value::Map(entries) = map else {
        panic!("Expected map");
    };
    assert_eq!(entries.len(), expected.len());
    for (key, value) in entries {
        assert_eq!(Some(&value.as_int().unwrap()), expected.get(key.as_str().unwrap()));
    }
}
