//! Constraints, defaults and presence rules, checked on both encode and decode.

use chrono::NaiveDate;
use stone_json::{
    DecodeOptions, Decoder, ErrorKind, Field, FloatKind, IntegerConstraints, IntegerKind,
    ListConstraints, RecordType, RecordValue, Schema, SchemaBuilder, StringConstraints, TypeId,
    TypeRef, Value, Violation,
};

fn settings() -> (Schema, TypeId) {
    let mut s = SchemaBuilder::new();
    let id = s.record(
        "cfg",
        "Settings",
        RecordType::new()
            .field(Field::new(
                "code",
                TypeRef::string_with(StringConstraints::default().max_length(5)),
            ))
            .field(Field::new(
                "tags",
                TypeRef::list_with(TypeRef::string(), ListConstraints::default().min_items(1)),
            ))
            .field(Field::new("retries", TypeRef::uint32()).default_value(3u32))
            .field(
                Field::new(
                    "level",
                    TypeRef::integer_with(
                        IntegerKind::Int32,
                        IntegerConstraints::default().min_value(-1).max_value(10),
                    ),
                )
                .default_value(0),
            )
            .field(Field::new("ratio", TypeRef::float32().nullable())),
    );
    (s.build().unwrap(), id)
}

fn violation(err: &stone_json::CodecError) -> &Violation {
    match &err.kind {
        ErrorKind::ConstraintViolation { violation } => violation,
        other => panic!("expected a constraint violation, got {other:?}"),
    }
}

#[test]
fn string_length_is_inclusive() {
    let (schema, cfg) = settings();
    let ok = stone_json::from_str(&schema, cfg, r#"{"code": "abcde", "tags": ["a"]}"#).unwrap();
    assert_eq!(ok.as_record().unwrap().get("code"), Some(&Value::from("abcde")));

    let err = stone_json::from_str(&schema, cfg, r#"{"code": "abcdef", "tags": ["a"]}"#)
        .unwrap_err();
    assert_eq!(
        violation(&err),
        &Violation::TooLong {
            max_length: 5,
            length: 6
        }
    );
    assert_eq!(err.path.to_string(), "$.code");
}

#[test]
fn empty_list_is_below_min_items() {
    let (schema, cfg) = settings();
    let err = stone_json::from_str(&schema, cfg, r#"{"code": "a", "tags": []}"#).unwrap_err();
    assert_eq!(
        violation(&err),
        &Violation::TooFewItems {
            min_items: 1,
            count: 0
        }
    );
}

#[test]
fn null_list_item_is_rejected() {
    let (schema, cfg) = settings();
    let err = stone_json::from_str(&schema, cfg, r#"{"code": "a", "tags": ["x", null]}"#)
        .unwrap_err();
    assert_eq!(violation(&err), &Violation::NullItem { index: 1 });
}

#[test]
fn absent_field_takes_its_default() {
    let (schema, cfg) = settings();
    let value = stone_json::from_str(&schema, cfg, r#"{"code": "a", "tags": ["x"]}"#).unwrap();
    let record = value.as_record().unwrap();
    assert_eq!(record.get("retries"), Some(&Value::UInt(3)));
    assert_eq!(record.get("level"), Some(&Value::Int(0)));
    assert!(!record.is_set("ratio"));

    let explicit = r#"{"code": "a", "tags": ["x"], "retries": 0}"#;
    let value = stone_json::from_str(&schema, cfg, explicit).unwrap();
    assert_eq!(value.as_record().unwrap().get("retries"), Some(&Value::UInt(0)));
}

#[test]
fn null_reads_as_absent() {
    let (schema, cfg) = settings();
    let defaulted = r#"{"code": "a", "tags": ["x"], "retries": null, "ratio": null}"#;
    let value = stone_json::from_str(&schema, cfg, defaulted).unwrap();
    assert_eq!(value.as_record().unwrap().get("retries"), Some(&Value::UInt(3)));

    let err = stone_json::from_str(&schema, cfg, r#"{"code": null, "tags": ["x"]}"#).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::RequiredValueMissing {
            field: "code".into()
        }
    );
}

#[test]
fn integers_respect_kind_and_declared_bounds() {
    let (schema, cfg) = settings();
    let decode = |extra: &str| {
        stone_json::from_str(&schema, cfg, &format!(r#"{{"code": "a", "tags": ["x"], {extra}}}"#))
    };

    let err = decode(r#""retries": 4294967296"#).unwrap_err();
    assert_eq!(
        violation(&err),
        &Violation::AboveMaximum {
            max: "4294967295".into(),
            actual: "4294967296".into()
        }
    );
    let err = decode(r#""retries": -1"#).unwrap_err();
    assert!(matches!(violation(&err), Violation::BelowMinimum { .. }));

    assert!(decode(r#""level": -1"#).is_ok());
    assert!(decode(r#""level": 10"#).is_ok());
    let err = decode(r#""level": 11"#).unwrap_err();
    assert_eq!(err.path.to_string(), "$.level");
    assert!(matches!(violation(&err), Violation::AboveMaximum { .. }));
}

#[test]
fn fractional_number_is_not_an_integer() {
    let (schema, cfg) = settings();
    let err = stone_json::from_str(&schema, cfg, r#"{"code": "a", "tags": ["x"], "retries": 1.5}"#)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedWireObject { .. }));

    let err = stone_json::from_str(&schema, cfg, r#"{"code": 5, "tags": ["x"]}"#).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedWireObject { .. }));
}

#[test]
fn float32_range_is_enforced() {
    let (schema, cfg) = settings();
    let ok = stone_json::from_str(&schema, cfg, r#"{"code": "a", "tags": ["x"], "ratio": 2}"#)
        .unwrap();
    assert_eq!(ok.as_record().unwrap().get("ratio"), Some(&Value::Float(2.0)));

    let err = stone_json::from_str(&schema, cfg, r#"{"code": "a", "tags": ["x"], "ratio": 1e39}"#)
        .unwrap_err();
    assert!(matches!(violation(&err), Violation::AboveMaximum { .. }));
}

#[test]
fn encode_validates_first() {
    let (schema, cfg) = settings();
    let value: Value = RecordValue::new(cfg)
        .with("code", "toolong")
        .with("tags", vec!["x"])
        .into();
    let err = stone_json::to_string(&schema, cfg, &value).unwrap_err();
    assert!(matches!(violation(&err), Violation::TooLong { .. }));

    let nan: Value = RecordValue::new(cfg)
        .with("code", "ok")
        .with("tags", vec!["x"])
        .with("ratio", f64::NAN)
        .into();
    let err = stone_json::to_string(&schema, cfg, &nan).unwrap_err();
    assert_eq!(violation(&err), &Violation::NotFinite);
}

#[test]
fn encode_emits_defaults_and_omits_absent_nullables() {
    let (schema, cfg) = settings();
    let value: Value = RecordValue::new(cfg)
        .with("code", "ok")
        .with("tags", vec!["x", "y"])
        .into();
    let json = stone_json::to_string(&schema, cfg, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"code":"ok","tags":["x","y"],"retries":3,"level":0}"#);
}

#[test]
fn validate_fills_defaults_in_place() {
    let (schema, cfg) = settings();
    let mut value: Value = RecordValue::new(cfg)
        .with("code", "ok")
        .with("tags", vec!["x"])
        .into();
    stone_json::validate(&schema, &TypeRef::reference(cfg), &mut value).unwrap();
    let record = value.as_record().unwrap();
    assert_eq!(record.get("retries"), Some(&Value::UInt(3)));
    assert!(!record.is_set("ratio"));

    let mut missing: Value = RecordValue::new(cfg).with("tags", vec!["x"]).into();
    let err = stone_json::validate(&schema, &TypeRef::reference(cfg), &mut missing).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::RequiredValueMissing {
            field: "code".into()
        }
    );
}

#[test]
fn unknown_fields_are_ignored_unless_denied() {
    let (schema, cfg) = settings();
    let text = r#"{"code": "a", "tags": ["x"], "retrys": 1}"#;
    let value = stone_json::from_str(&schema, cfg, text).unwrap();
    assert_eq!(value.as_record().unwrap().get("retries"), Some(&Value::UInt(3)));

    let strict =
        Decoder::new(&schema).with_options(DecodeOptions::default().deny_unknown_fields(true));
    let err = strict.decode_str(cfg, text).unwrap_err();
    match &err.kind {
        ErrorKind::UnknownField {
            field, suggestion, ..
        } => {
            assert_eq!(field, "retrys");
            assert_eq!(suggestion.as_deref(), Some("retries"));
        }
        other => panic!("expected UnknownField, got {other:?}"),
    }
    assert_eq!(err.path.to_string(), "$.retrys");
}

#[test]
fn patterns_must_match_the_whole_string() {
    let mut s = SchemaBuilder::new();
    let user = s.record(
        "acct",
        "User",
        RecordType::new().field(Field::new(
            "handle",
            TypeRef::string_with(StringConstraints::default().pattern("[a-z]+")),
        )),
    );
    let schema = s.build().unwrap();

    assert!(stone_json::from_str(&schema, user, r#"{"handle": "alice"}"#).is_ok());
    let err = stone_json::from_str(&schema, user, r#"{"handle": "alice1"}"#).unwrap_err();
    assert_eq!(
        violation(&err),
        &Violation::PatternMismatch {
            pattern: "[a-z]+".into()
        }
    );
}

#[test]
fn binary_and_timestamp_use_text_encodings() {
    let mut s = SchemaBuilder::new();
    let blob = s.record(
        "store",
        "Blob",
        RecordType::new()
            .field(Field::new("data", TypeRef::binary()))
            .field(Field::new("at", TypeRef::timestamp("%Y-%m-%dT%H:%M:%SZ")))
            .field(Field::new("weight", TypeRef::float_with(FloatKind::Float64, Default::default()))),
    );
    let schema = s.build().unwrap();

    let at = NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(3, 4, 5))
        .unwrap();
    let value: Value = RecordValue::new(blob)
        .with("data", Value::Binary(b"hi!".to_vec()))
        .with("at", at)
        .with("weight", 0.25)
        .into();
    let json = stone_json::to_string(&schema, blob, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"data":"aGkh","at":"2024-01-02T03:04:05Z","weight":0.25}"#);
    assert_eq!(stone_json::from_str(&schema, blob, &json).unwrap(), value);

    let bad_base64 = r#"{"data": "@@", "at": "2024-01-02T03:04:05Z", "weight": 1}"#;
    let err = stone_json::from_str(&schema, blob, bad_base64).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedWireObject { .. }));
    assert_eq!(err.path.to_string(), "$.data");

    let bad_time = r#"{"data": "", "at": "yesterday", "weight": 1}"#;
    let err = stone_json::from_str(&schema, blob, bad_time).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedWireObject { .. }));
    assert_eq!(err.path.to_string(), "$.at");
}

#[test]
fn date_only_timestamps_read_as_midnight() {
    let mut s = SchemaBuilder::new();
    let event = s.record(
        "cal",
        "Event",
        RecordType::new().field(Field::new("on", TypeRef::timestamp("%Y-%m-%d"))),
    );
    let schema = s.build().unwrap();

    let on = NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let value: Value = RecordValue::new(event).with("on", on).into();
    let json = stone_json::to_string(&schema, event, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"on":"2024-01-02"}"#);
    assert_eq!(stone_json::from_str(&schema, event, &json).unwrap(), value);
}

#[test]
fn float_fields_take_float_values() {
    let (schema, cfg) = settings();
    let ty = TypeRef::reference(cfg);
    let mut value: Value = RecordValue::new(cfg)
        .with("code", "a")
        .with("tags", vec!["x"])
        .with("ratio", 3)
        .into();
    let err = stone_json::validate(&schema, &ty, &mut value).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));
    assert_eq!(err.path.to_string(), "$.ratio");
    let err = stone_json::to_string(&schema, cfg, &value).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue { .. }));

    let mut value: Value = RecordValue::new(cfg)
        .with("code", "a")
        .with("tags", vec!["x"])
        .with("ratio", 3.0)
        .into();
    stone_json::validate(&schema, &ty, &mut value).unwrap();
    let json = stone_json::to_string(&schema, cfg, &value).unwrap();
    insta::assert_snapshot!(json, @r#"{"code":"a","tags":["x"],"retries":3,"level":0,"ratio":3.0}"#);
    assert_eq!(stone_json::from_str(&schema, cfg, &json).unwrap(), value);
}
