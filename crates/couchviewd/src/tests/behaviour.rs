//! Behavioural tests for the query protocol using `rstest-bdd`.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value as Json, json};

use super::support::{HealthEvent, TestWorld, strip_quotes};

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}

fn design_document(name: &str) -> Json {
    match name {
        "blog" => json!({
            "_id": "_design/blog",
            "views": {
                "by_tag": {
                    "map": "func Map(doc) {\n  for tag in doc.tags {\n    emit(tag, 1)\n  }\n}",
                    "reduce": "func Reduce(keys, values, rereduce) {\n  total := 0\n  for v in values { total += v }\n  return total\n}"
                },
                "broken": { "map": "func Map(doc) { emit( }" }
            },
            "filters": {
                "posts": "func Filter(doc, req) { return doc.type == \"post\" }"
            },
            "updates": {
                "stamp": "func Update(doc, req) {\n  doc.stamped = true\n  return [doc, \"stamped\"]\n}"
            },
            "validate_doc_update": "func Validate(newDoc, oldDoc, userCtx, secObj) {\n  if newDoc.type == nil {\n    return Forbidden(\"documents need a type\")\n  }\n  if !has(userCtx.roles, \"writer\") {\n    return Unauthorized(\"writers only\")\n  }\n}",
            "rewrites": "func Rewrite(req) {\n  return {path: \"/posts/\" + req.query.id, method: req.method}\n}"
        }),
        other => panic!("unknown design document {other}"),
    }
}

fn reduce_snippet(name: &str) -> &'static str {
    match name {
        "padding" => "func Reduce(keys, values, rereduce) {\n  out := \"\"\n  for len(out) < 300 { out += \"x\" }\n  return out\n}",
        "count" => "func Reduce(keys, values, rereduce) { return len(values) }",
        other => panic!("unknown reduce snippet {other}"),
    }
}

fn parse_json(text: &str) -> Json {
    serde_json::from_str(text).unwrap_or_else(|error| panic!("invalid JSON `{text}`: {error}"))
}

#[given("a line limit of {limit} bytes")]
fn given_line_limit(world: &RefCell<TestWorld>, limit: usize) {
    world.borrow_mut().max_line_bytes = limit;
}

#[given("the {name} design document is registered")]
fn given_design_document(world: &RefCell<TestWorld>, name: String) {
    send_design_document(world, &name);
    assert_eq!(world.borrow().response(), &json!(true));
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_failing_loader();
}

#[when("the {name} design document is sent")]
fn when_design_document_sent(world: &RefCell<TestWorld>, name: String) {
    send_design_document(world, &name);
}

#[when("the server receives {line}")]
fn when_server_receives(world: &RefCell<TestWorld>, line: String) {
    world.borrow_mut().send(&[line.as_str()]);
}

#[when("the {name} reduce runs over {rows}")]
fn when_reduce_runs(world: &RefCell<TestWorld>, name: String, rows: String) {
    let line = json!(["reduce", [reduce_snippet(strip_quotes(&name))], parse_json(&rows)]);
    world.borrow_mut().send(&[line.to_string().as_str()]);
}

#[when("an oversize line of {size} bytes arrives")]
fn when_oversize_line(world: &RefCell<TestWorld>, size: usize) {
    let line = format!("[\"add_fun\",\"{}\"]", "x".repeat(size));
    world.borrow_mut().send(&[line.as_str()]);
}

#[when("the server bootstraps")]
fn when_bootstraps(world: &RefCell<TestWorld>) {
    world.borrow_mut().bootstrap();
}

#[when("the daemon serves {line}")]
fn when_daemon_serves(world: &RefCell<TestWorld>, line: String) {
    world.borrow_mut().serve_daemon(&[line.as_str()]);
}

#[then("the reply is {expected}")]
fn then_response_is(world: &RefCell<TestWorld>, expected: String) {
    assert_eq!(world.borrow().response(), &parse_json(&expected));
}

#[then("the command fails with {kind}")]
fn then_error_kind(world: &RefCell<TestWorld>, kind: String) {
    let world_ref = world.borrow();
    let response = world_ref.response();
    assert_eq!(response.get(0), Some(&json!("error")), "not an error: {response}");
    assert_eq!(response.get(1), Some(&json!(strip_quotes(&kind))));
}

#[then("the error message mentions {text}")]
fn then_error_mentions(world: &RefCell<TestWorld>, text: String) {
    let world_ref = world.borrow();
    let message = world_ref
        .response()
        .get(2)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_owned();
    assert!(
        message.contains(strip_quotes(&text)),
        "`{message}` does not mention {text}"
    );
}

#[then("the command succeeds")]
fn then_response_succeeds(world: &RefCell<TestWorld>) {
    let world_ref = world.borrow();
    let response = world_ref.response();
    assert_eq!(response.get(0), Some(&json!(true)), "unexpected reply {response}");
}

#[then("the logs include {message}")]
fn then_logs_include(world: &RefCell<TestWorld>, message: String) {
    let logs = world.borrow().log_messages();
    assert!(
        logs.iter().any(|log| log == strip_quotes(&message)),
        "missing log {message}: {logs:?}"
    );
}

#[then("the session counted {commands} commands and {errors} errors")]
fn then_session_counted(world: &RefCell<TestWorld>, commands: usize, errors: usize) {
    let summary = world.borrow().summary.expect("no session ran");
    assert_eq!((summary.commands, summary.errors), (commands, errors));
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<TestWorld>) {
    assert!(world.borrow().bootstrap_error().is_some(), "bootstrap succeeded unexpectedly");
    let events = world.borrow().reporter.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::BootstrapFailed(_))),
        "bootstrap failure event missing: {events:?}"
    );
}

#[then("the reporter recorded a session of {commands} commands")]
fn then_reporter_session(world: &RefCell<TestWorld>, commands: usize) {
    let events = world.borrow().reporter.events();
    assert!(events.contains(&HealthEvent::BootstrapSucceeded));
    assert!(
        events.iter().any(|event| matches!(
            event,
            HealthEvent::SessionFinished(summary) if summary.commands == commands
        )),
        "session event missing: {events:?}"
    );
}

fn send_design_document(world: &RefCell<TestWorld>, name: &str) {
    let unquoted = strip_quotes(name);
    let document = design_document(unquoted);
    let id = document
        .get("_id")
        .cloned()
        .unwrap_or_else(|| json!(unquoted));
    let line = json!(["ddoc", "new", id, document]);
    world.borrow_mut().send(&[line.to_string().as_str()]);
}

#[scenario(path = "tests/features/query_server.feature")]
fn query_server(world: RefCell<TestWorld>) {
    let _ = world;
}
