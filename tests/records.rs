//! Plain records: field order, absent nullables, inheritance outside subtype
//! trees, and recursive types.

use stone_json::{
    ErrorKind, Field, MAX_DEPTH, RecordType, RecordValue, Schema, SchemaBuilder, SchemaErrorKind,
    TypeId, TypeRef, UnionValue, Value, WireObject, WireValue,
};

struct Accounts {
    schema: Schema,
    base: TypeId,
    team: TypeId,
}

/// `Account <- TeamAccount`, without enumerated subtypes.
fn accounts() -> Accounts {
    let mut s = SchemaBuilder::new();
    let base = s.record(
        "users",
        "Account",
        RecordType::new()
            .field(Field::new("account_id", TypeRef::string()))
            .field(Field::new("email", TypeRef::string().nullable()))
            .field(Field::new("disabled", TypeRef::boolean()).default_value(false)),
    );
    let team = s.record(
        "users",
        "TeamAccount",
        RecordType::new()
            .extends(base)
            .field(Field::new("team", TypeRef::string())),
    );
    Accounts {
        schema: s.build().unwrap(),
        base,
        team,
    }
}

#[test]
fn fields_in_declaration_order_root_first() {
    let a = accounts();
    let value: Value = RecordValue::new(a.team)
        .with("team", "core")
        .with("account_id", "dbid:1")
        .with("email", "x@y.z")
        .into();
    let json = stone_json::to_string(&a.schema, a.team, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"account_id":"dbid:1","email":"x@y.z","disabled":false,"team":"core"}"#);

    let fields: Vec<_> = a.schema.linearized_fields(a.team).map(|f| f.name.as_str()).collect();
    assert_eq!(fields, ["account_id", "email", "disabled", "team"]);
}

#[test]
fn absent_nullable_is_omitted() {
    let a = accounts();
    let value: Value = RecordValue::new(a.base)
        .with("account_id", "dbid:1")
        .with("email", Option::<&str>::None)
        .into();
    let json = stone_json::to_string(&a.schema, a.base, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"account_id":"dbid:1","disabled":false}"#);

    let back = stone_json::from_str(&a.schema, a.base, &json).unwrap();
    let record = back.as_record().unwrap();
    assert!(!record.is_set("email"));
    assert_eq!(record.get("disabled"), Some(&Value::Bool(false)));
}

#[test]
fn inheritance_without_subtypes_is_static() {
    let a = accounts();
    let value: Value = RecordValue::new(a.team)
        .with("account_id", "dbid:1")
        .with("team", "core")
        .into();

    // a base-typed slot only carries the base fields, with no tag
    let json = stone_json::to_string(&a.schema, a.base, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"account_id":"dbid:1","disabled":false}"#);
    let back = stone_json::from_str(&a.schema, a.base, &json).unwrap();
    assert_eq!(back.as_record().unwrap().type_id(), a.base);

    let json = stone_json::to_string(&a.schema, a.team, &value).unwrap();
    let back = stone_json::from_str(&a.schema, a.team, &json).unwrap();
    assert_eq!(back.as_record().unwrap().type_id(), a.team);
    assert!(!a.schema.is_subtype_tree_member(a.base));
    assert!(a.schema.is_a(a.team, a.base));
    assert!(!a.schema.is_a(a.base, a.team));
}

#[test]
fn record_value_must_fit_the_slot() {
    let a = accounts();
    let base: Value = RecordValue::new(a.base).with("account_id", "dbid:1").into();
    let err = stone_json::to_string(&a.schema, a.team, &base).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));

    let wrong: Value = RecordValue::new(a.base).with("account_id", 7).into();
    let err = stone_json::to_string(&a.schema, a.base, &wrong).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));
    assert_eq!(err.path.to_string(), "$.account_id");
}

#[test]
fn non_object_is_malformed() {
    let a = accounts();
    for text in ["[]", "\"dbid:1\"", "null", "3"] {
        let err = stone_json::from_str(&a.schema, a.base, text).unwrap_err();
        assert!(
            matches!(err.kind, ErrorKind::MalformedWireObject { .. }),
            "{text}: {err}"
        );
    }
}

#[test]
fn recursive_record() {
    let mut s = SchemaBuilder::new();
    let node = s.declare_record("tree", "Node");
    s.define_record(
        node,
        RecordType::new()
            .field(Field::new("name", TypeRef::string()))
            .field(Field::new(
                "children",
                TypeRef::list(TypeRef::reference(node)).nullable(),
            )),
    );
    let schema = s.build().unwrap();

    let leaf = |name: &str| Value::from(RecordValue::new(node).with("name", name));
    let value: Value = RecordValue::new(node)
        .with("name", "root")
        .with(
            "children",
            vec![
                leaf("a"),
                RecordValue::new(node)
                    .with("name", "b")
                    .with("children", vec![leaf("c")])
                    .into(),
            ],
        )
        .into();
    let json = stone_json::to_string(&schema, node, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"name":"root","children":[{"name":"a"},{"name":"b","children":[{"name":"c"}]}]}"#);
    assert_eq!(stone_json::from_str(&schema, node, &json).unwrap(), value);

    let err = stone_json::from_str(&schema, node, r#"{"name": "r", "children": [{"nam": "x"}]}"#)
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::RequiredValueMissing {
            field: "name".into()
        }
    );
    assert_eq!(err.path.to_string(), "$.children[0]");
}

#[test]
fn deeply_nested_wire_is_rejected() {
    let mut s = SchemaBuilder::new();
    let node = s.declare_record("tree", "Node");
    s.define_record(
        node,
        RecordType::new()
            .field(Field::new("name", TypeRef::string()))
            .field(Field::new(
                "children",
                TypeRef::list(TypeRef::reference(node)).nullable(),
            )),
    );
    let schema = s.build().unwrap();

    let mut wire: WireValue = WireObject::from_iter([("name", WireValue::from("leaf"))]).into();
    for _ in 0..200 {
        wire = WireObject::from_iter([
            ("name", WireValue::from("n")),
            ("children", WireValue::Array(vec![wire])),
        ])
        .into();
    }
    let err = stone_json::decode(&schema, node, &wire).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedWireObject { .. }));
    assert_eq!(err.path.depth(), MAX_DEPTH + 1);
}

#[test]
fn type_ids_from_another_schema_are_rejected() {
    let a = accounts();
    let mut other = SchemaBuilder::new();
    for name in ["A", "B", "C"] {
        other.record("other", name, RecordType::new());
    }
    let foreign = other.record(
        "other",
        "D",
        RecordType::new().field(Field::new("x", TypeRef::string())),
    );
    assert!(!a.schema.contains(foreign));

    let value: Value = RecordValue::new(foreign).with("x", "y").into();
    let err = stone_json::to_string(&a.schema, foreign, &value).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));
    let err = stone_json::to_string(&a.schema, a.base, &value).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));

    let err = stone_json::from_str(&a.schema, foreign, r#"{"x": "y"}"#).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));

    let mut v = value.clone();
    assert!(stone_json::validate(&a.schema, &TypeRef::reference(foreign), &mut v).is_err());
    assert!(UnionValue::new(&a.schema, foreign, "x").is_err());
}

#[test]
fn inconsistent_schemas_fail_to_build() {
    let mut s = SchemaBuilder::new();
    s.declare_record("ns", "Missing");
    let err = s.build().unwrap_err();
    assert!(matches!(err.kind, SchemaErrorKind::UndefinedType { .. }));

    let mut s = SchemaBuilder::new();
    s.record(
        "ns",
        "Bad",
        RecordType::new().field(Field::new("a.b", TypeRef::string())),
    );
    assert!(matches!(
        s.build().unwrap_err().kind,
        SchemaErrorKind::InvalidName { .. }
    ));

    let mut s = SchemaBuilder::new();
    s.record(
        "ns",
        "Bad",
        RecordType::new().field(Field::new("n", TypeRef::uint32()).default_value("three")),
    );
    assert!(matches!(
        s.build().unwrap_err().kind,
        SchemaErrorKind::InvalidDefault { .. }
    ));

    let mut s = SchemaBuilder::new();
    s.record(
        "ns",
        "Bad",
        RecordType::new().field(Field::new("n", TypeRef::string().nullable()).default_value("x")),
    );
    assert!(matches!(
        s.build().unwrap_err().kind,
        SchemaErrorKind::NullableDefault { .. }
    ));

    let mut s = SchemaBuilder::new();
    let id = s.record("ns", "Twice", RecordType::new());
    s.define_record(id, RecordType::new());
    let err = s.build().unwrap_err();
    assert!(matches!(err.kind, SchemaErrorKind::AlreadyDefined { .. }));
    assert_eq!(err.to_string(), "type `ns.Twice` was already given a definition");
}
