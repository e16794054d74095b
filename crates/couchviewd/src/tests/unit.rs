//! Unit tests for the registry handlers and bootstrap wiring.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::{Map, Value as Json, json};

use couchview_config::{Config, LogFormat};
use couchview_sandbox::{Compiler, InvocationError, Request};

use crate::bootstrap::{StaticConfigLoader, bootstrap_with};
use crate::protocol::{Command, ResetConfig, Response};
use crate::server::{DesignDocumentBundle, HandlerError, QueryServer, SessionLog};
use crate::telemetry;

use super::support::{HealthEvent, RecordingHealthReporter};

#[fixture]
fn server() -> QueryServer {
    QueryServer::with_compiler(Compiler::new().with_max_call_depth(32))
}

fn run(server: &mut QueryServer, command: Command) -> (Result<Response, HandlerError>, Vec<String>) {
    let mut logs = SessionLog::new();
    let outcome = server.execute(command, 0, &mut logs);
    (outcome, logs.into_messages())
}

fn object(value: Json) -> Map<String, Json> {
    match value {
        Json::Object(entries) => entries,
        other => panic!("expected an object, got {other}"),
    }
}

fn register(server: &mut QueryServer, document: Json) {
    let (outcome, _) = run(
        server,
        Command::NewDesignDocument {
            id: "_design/app".to_owned(),
            document: object(document),
        },
    );
    assert_eq!(outcome.expect("ddoc registers"), Response::Ok);
}

#[rstest]
fn failed_add_fun_leaves_state_unchanged(mut server: QueryServer) {
    let (outcome, _) = run(
        &mut server,
        Command::AddFunction {
            source: "func Validate(n, o, u, s) {}".to_owned(),
        },
    );
    let error = outcome.expect_err("validate functions cannot be added");
    assert_eq!(error.wire_kind(), "invalid_function");
    assert_eq!(server.map_count(), 0);
    assert!(server.reduce_sources().is_empty());
}

#[rstest]
fn add_fun_keeps_reduce_sources_and_reset_clears_them(mut server: QueryServer) {
    let source = "func Reduce(keys, values, rereduce) { return 0 }".to_owned();
    let (outcome, _) = run(&mut server, Command::AddFunction { source: source.clone() });
    assert_eq!(outcome.expect("reduce is accepted"), Response::Ok);
    assert_eq!(server.reduce_sources(), [source].as_slice());

    let config = ResetConfig {
        reduce_limit: true,
        timeout: Some(5000),
        ..ResetConfig::default()
    };
    let (reset, _) = run(&mut server, Command::Reset { config: config.clone() });
    assert_eq!(reset.expect("reset succeeds"), Response::Ok);
    assert!(server.reduce_sources().is_empty());
    assert_eq!(server.config(), &config);
}

fn deeply_nested_reduce(depth: usize) -> String {
    format!(
        "func Reduce(keys, values, rereduce) {{ return {}len(values){} }}",
        "(".repeat(depth),
        ")".repeat(depth)
    )
}

#[rstest]
fn deeply_nested_add_fun_is_an_invalid_function(mut server: QueryServer) {
    let (outcome, _) = run(
        &mut server,
        Command::AddFunction {
            source: deeply_nested_reduce(100_000),
        },
    );
    let error = outcome.expect_err("nesting limit rejects the source");
    assert_eq!(error.wire_kind(), "invalid_function");
    assert!(server.reduce_sources().is_empty());

    let (reset, _) = run(
        &mut server,
        Command::Reset {
            config: ResetConfig::default(),
        },
    );
    assert_eq!(reset.expect("server keeps serving"), Response::Ok);
}

#[rstest]
fn deeply_nested_reduce_leaves_a_null_slot(mut server: QueryServer) {
    let (outcome, _) = run(
        &mut server,
        Command::Reduce {
            sources: vec![deeply_nested_reduce(100_000), deeply_nested_reduce(3)],
            keys: vec![json!(["a", "id1"]), json!(["b", "id2"])],
            values: vec![json!(1), json!(2)],
        },
    );
    assert_eq!(
        outcome.expect("reduce replies"),
        Response::Results(vec![Json::Null, json!(2)])
    );
}

#[rstest]
fn integer_sums_reduce_to_integers(mut server: QueryServer) {
    let sum = "func Reduce(keys, values, rereduce) {\n  total := 0\n  for v in values { total += v }\n  return total\n}";
    let (reduced, _) = run(
        &mut server,
        Command::Reduce {
            sources: vec![sum.to_owned()],
            keys: vec![json!([1, "a"]), json!([2, "b"]), json!([null, "c"])],
            values: vec![json!(10), json!(20), json!(3)],
        },
    );
    let reduced = reduced.expect("reduce replies");
    assert_eq!(reduced, Response::Results(vec![json!(33)]));
    assert_eq!(serde_json::to_string(&reduced).expect("encodes"), "[true,[33]]");

    let (rereduced, _) = run(
        &mut server,
        Command::Rereduce {
            sources: vec![sum.to_owned()],
            values: vec![json!(10), json!(20), json!(3)],
        },
    );
    assert_eq!(
        rereduced.expect("rereduce replies"),
        Response::Results(vec![json!(33)])
    );
}

#[rstest]
fn map_runtime_failures_are_command_errors(mut server: QueryServer) {
    let (added, _) = run(
        &mut server,
        Command::AddFunction {
            source: "func Map(doc) { emit(doc._id, doc.count / 0) }".to_owned(),
        },
    );
    added.expect("map compiles");
    let (outcome, _) = run(
        &mut server,
        Command::MapDocument {
            document: json!({"_id": "a", "count": 1}),
        },
    );
    let error = outcome.expect_err("division by zero fails");
    assert_eq!(error.wire_kind(), "runtime_error");
    assert!(error.wire_message().contains("division by zero"));
}

#[rstest]
fn snippet_logs_are_collected_in_order(mut server: QueryServer) {
    let (added, _) = run(
        &mut server,
        Command::AddFunction {
            source: "func Map(doc) {\n  log(\"first\")\n  log(doc)\n}".to_owned(),
        },
    );
    added.expect("map compiles");
    let (outcome, logs) = run(
        &mut server,
        Command::MapDocument {
            document: json!({"_id": "a"}),
        },
    );
    outcome.expect("map runs");
    assert_eq!(logs, vec!["first".to_owned(), r#"{"_id":"a"}"#.to_owned()]);
}

#[rstest]
fn bundles_keep_maps_whose_reduce_fails() {
    let document = object(json!({
        "views": {
            "all": {
                "map": "func Map(doc) { emit(nil, 1) }",
                "reduce": "func Reduce(keys, values, rereduce) {"
            }
        },
        "filters": { "bad": "func Map(doc) {}" },
        "language": "couchview"
    }));
    let mut logs = SessionLog::new();
    let bundle = DesignDocumentBundle::compile(
        &Compiler::new(),
        "_design/app",
        &document,
        &mut logs,
    );
    let view = bundle.view("all").expect("map survives");
    assert!(view.reduce.is_none());
    assert!(bundle.filter("bad").is_none());
    assert_eq!(
        logs.messages(),
        [
            "Failed to compile reduce function: all".to_owned(),
            "Failed to compile filter function: bad".to_owned(),
        ]
        .as_slice()
    );
}

#[rstest]
fn reregistering_replaces_the_whole_bundle(mut server: QueryServer) {
    register(
        &mut server,
        json!({"filters": {"all": "func Filter(doc, req) { return true }"}}),
    );
    register(
        &mut server,
        json!({"views": {"v": {"map": "func Map(doc) { emit(1, 1) }"}}}),
    );
    let design = server.design("_design/app").expect("registered");
    assert!(design.filter("all").is_none());
    assert_eq!(design.view_names().collect::<Vec<_>>(), vec!["v"]);
}

#[rstest]
fn view_reduce_without_a_reduce_is_not_found(mut server: QueryServer) {
    register(
        &mut server,
        json!({"views": {"v": {"map": "func Map(doc) { emit(1, 1) }"}}}),
    );
    let (outcome, _) = run(
        &mut server,
        Command::ViewReduce {
            id: "_design/app".to_owned(),
            name: "v".to_owned(),
            keys: vec![json!(1)],
            values: vec![json!(1)],
        },
    );
    assert_eq!(outcome.expect_err("no reduce").wire_kind(), "not_found");
}

#[rstest]
#[case("return {reason: \"no\"}", "{\"reason\":\"no\"}")]
#[case("return \"plain text\"", "plain text")]
fn unclassified_validation_results_are_rendered(
    mut server: QueryServer,
    #[case] body: &str,
    #[case] rendered: &str,
) {
    register(
        &mut server,
        json!({"validate_doc_update": format!("func Validate(n, o, u, s) {{ {body} }}")}),
    );
    let (outcome, _) = run(
        &mut server,
        Command::Validate {
            id: "_design/app".to_owned(),
            new_doc: json!({}),
            old_doc: Json::Null,
            user_ctx: serde_json::from_value(json!({"name": "bob"})).expect("user context"),
            sec_obj: serde_json::from_value(json!({})).expect("security object"),
        },
    );
    let error = outcome.expect_err("validation fails");
    assert_eq!(error.wire_kind(), "validation_failed");
    assert_eq!(error.wire_message(), rendered);
}

#[rstest]
fn updates_returning_a_bare_value_are_invalid(mut server: QueryServer) {
    register(
        &mut server,
        json!({"updates": {"bad": "func Update(doc, req) { return doc }"}}),
    );
    let (outcome, _) = run(
        &mut server,
        Command::Update {
            id: "_design/app".to_owned(),
            name: "bad".to_owned(),
            document: json!({"_id": "a"}),
            request: Box::new(Request::default()),
        },
    );
    assert_eq!(outcome.expect_err("not a pair").wire_kind(), "invalid_result");
}

#[rstest]
fn reduce_limit_allows_small_results(mut server: QueryServer) {
    let (reset, _) = run(
        &mut server,
        Command::Reset {
            config: ResetConfig {
                reduce_limit: true,
                ..ResetConfig::default()
            },
        },
    );
    reset.expect("reset succeeds");
    let (outcome, _) = run(
        &mut server,
        Command::Rereduce {
            sources: vec!["func Reduce(keys, values, rereduce) { return values }".to_owned()],
            values: vec![json!(1), json!(2)],
        },
    );
    assert_eq!(
        outcome.expect("small output passes"),
        Response::Results(vec![json!([1, 2])])
    );
}

#[rstest]
#[case(HandlerError::invalid_function("x"), "invalid_function")]
#[case(HandlerError::not_found("x"), "not_found")]
#[case(HandlerError::Forbidden("x".to_owned()), "forbidden")]
#[case(HandlerError::Unauthorized("x".to_owned()), "unauthorized")]
#[case(HandlerError::ValidationFailed("x".to_owned()), "validation_failed")]
#[case(HandlerError::ReduceOverflow { output_bytes: 300, input_bytes: 10 }, "reduce_overflow_error")]
#[case(
    HandlerError::Invocation(InvocationError::InvalidResult {
        kind: couchview_sandbox::FunctionKind::Rewrite,
        message: "x".to_owned(),
    }),
    "invalid_result"
)]
fn handler_errors_map_to_wire_kinds(#[case] error: HandlerError, #[case] kind: &str) {
    assert_eq!(error.wire_kind(), kind);
}

#[rstest]
fn bootstrap_reports_success_and_serves() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let loader = StaticConfigLoader::new(Config::default());
    let mut daemon = bootstrap_with(&loader, reporter.clone()).expect("bootstrap succeeds");
    assert_eq!(daemon.config(), &Config::default());

    let mut output = Vec::new();
    let summary = daemon
        .serve(std::io::Cursor::new("[\"reset\"]\n[\"nope\"]\n"), &mut output)
        .expect("serve succeeds");
    assert_eq!((summary.commands, summary.errors), (2, 1));

    let events = reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert!(events.contains(&HealthEvent::BootstrapSucceeded));
    assert_eq!(events.last(), Some(&HealthEvent::SessionFinished(summary)));
}

#[test]
fn telemetry_keeps_the_first_installed_format() {
    let first = telemetry::initialise(&Config::default()).expect("telemetry installs");
    let compact = Config {
        log_format: LogFormat::Compact,
        ..Config::default()
    };
    let second = telemetry::initialise(&compact).expect("telemetry is already installed");
    assert_eq!(second.format(), first.format());
}
