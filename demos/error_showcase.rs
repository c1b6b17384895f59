//! Error Showcase: the diagnostics stone-json produces for bad input.
//!
//! Run with: cargo run --example error_showcase

use miette::{GraphicalReportHandler, GraphicalTheme, highlighters::SyntectHighlighter};
use stone_json::{
    DecodeOptions, Decoder, Field, RecordType, Schema, SchemaBuilder, StringConstraints, TypeId,
    TypeRef, UnionType,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn render_error(err: &dyn miette::Diagnostic) -> String {
    let mut output = String::new();
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode())
        .with_syntax_highlighting(SyntectHighlighter::default());
    if let Err(e) = handler.render_report(&mut output, err) {
        output = format!("<failed to render report: {e}>");
    }
    output
}

fn print_scenario(name: &str, description: &str) {
    println!();
    println!("{}", "═".repeat(78));
    println!("SCENARIO: {name}");
    println!("{}", "─".repeat(78));
    println!("{description}");
    println!("{}", "═".repeat(78));
}

fn print_json(json: &str) {
    println!();
    println!("JSON Input:");
    println!("{}", "─".repeat(60));
    for (i, line) in json.lines().enumerate() {
        println!("{:3} │ {line}", i + 1);
    }
    println!("{}", "─".repeat(60));
}

fn show(result: stone_json::Result<stone_json::Value>) {
    match result {
        Ok(_) => println!("Unexpected success!"),
        Err(e) => {
            println!("\nError:");
            println!("{}", render_error(&e));
        }
    }
}

struct Api {
    schema: Schema,
    user: TypeId,
    status: TypeId,
}

fn api() -> Api {
    let mut s = SchemaBuilder::new();
    let user = s.record(
        "users",
        "User",
        RecordType::new()
            .field(Field::new(
                "username",
                TypeRef::string_with(StringConstraints::default().max_length(8).pattern("[a-z]+")),
            ))
            .field(Field::new("email", TypeRef::string()))
            .field(Field::new("age", TypeRef::uint32())),
    );
    let status = s.union(
        "users",
        "Status",
        UnionType::new()
            .variant(Field::void("active"))
            .variant(Field::void("suspended"))
            .variant(Field::new("invited_by", TypeRef::reference(user))),
    );
    match s.build() {
        Ok(schema) => Api {
            schema,
            user,
            status,
        },
        Err(e) => {
            eprintln!("{}", render_error(&e));
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

fn scenario_syntax_error_multiline(api: &Api) {
    print_scenario(
        "Syntax Error: Multiline JSON",
        "Error location is correctly identified in multiline JSON.",
    );
    let json = "{\n  \"username\": \"alice\",\n  \"age\": ???\n}";
    print_json(json);
    show(stone_json::from_str(&api.schema, api.user, json));
}

fn scenario_constraint(api: &Api) {
    print_scenario(
        "Constraint Violation",
        "The username is longer than the declared max_length.",
    );
    let json = r#"{"username": "alexandria", "email": "a@example.com", "age": 30}"#;
    print_json(json);
    show(stone_json::from_str(&api.schema, api.user, json));
}

fn scenario_pattern(api: &Api) {
    print_scenario(
        "Pattern Mismatch",
        "Usernames must be lowercase letters only.",
    );
    let json = r#"{"username": "Alice", "email": "a@example.com", "age": 30}"#;
    print_json(json);
    show(stone_json::from_str(&api.schema, api.user, json));
}

fn scenario_missing(api: &Api) {
    print_scenario(
        "Missing Required Field",
        "The object has no `email` and the field has no default.",
    );
    let json = r#"{"username": "alice", "age": 30}"#;
    print_json(json);
    show(stone_json::from_str(&api.schema, api.user, json));
}

fn scenario_unknown_field(api: &Api) {
    print_scenario(
        "Unknown Field",
        "Strict decoding rejects keys that match no field and suggests a close one.",
    );
    let json = r#"{"username": "alice", "emial": "a@example.com", "age": 30}"#;
    print_json(json);
    let strict =
        Decoder::new(&api.schema).with_options(DecodeOptions::default().deny_unknown_fields(true));
    show(strict.decode_str(api.user, json));
}

fn scenario_unknown_tag(api: &Api) {
    print_scenario(
        "Unrecognized Union Tag",
        "The union has no catch-all variant, so an unknown tag is an error.",
    );
    let json = r#"{".tag": "suspnded"}"#;
    print_json(json);
    show(stone_json::from_str(&api.schema, api.status, json));
}

fn scenario_collapsed_payload(api: &Api) {
    print_scenario(
        "Collapsed Union Payload",
        "A record payload is inlined next to the tag; its fields are checked in place.",
    );
    let json = r#"{".tag": "invited_by", "username": "bob", "email": "b@example.com", "age": -1}"#;
    print_json(json);
    show(stone_json::from_str(&api.schema, api.status, json));
}

fn main() {
    let api = api();
    scenario_syntax_error_multiline(&api);
    scenario_constraint(&api);
    scenario_pattern(&api);
    scenario_missing(&api);
    scenario_unknown_field(&api);
    scenario_unknown_tag(&api);
    scenario_collapsed_payload(&api);
    println!();
}
