//! Unit tests for the public compiler surface.

use rstest::rstest;
use serde_json::{Value as Json, json};

use crate::{
    CompileError, Compiler, FunctionKind, HostFunction, HostProfile, InvocationError,
    MapFunction, ReduceFunction, Request, RewriteFunction, TypedFunction, UpdateFunction,
};

fn no_logs() -> Vec<String> {
    Vec::new()
}

#[rstest]
#[case("func Map(doc) {}", FunctionKind::Map)]
#[case("  \n func Reduce(keys, values, rereduce) { return 0 }", FunctionKind::Reduce)]
#[case("func Update(doc, req) { return [doc, \"\"] }", FunctionKind::Update)]
#[case("func Filter(doc, req) { return true }", FunctionKind::Filter)]
#[case("func Validate(newDoc, oldDoc, userCtx, secObj) {}", FunctionKind::Validate)]
#[case("func Rewrite(req) { return \"/\" }", FunctionKind::Rewrite)]
fn compile_detects_each_kind(#[case] source: &str, #[case] kind: FunctionKind) {
    let compiled = Compiler::new()
        .compile(source, Some(kind))
        .expect("source compiles");
    assert_eq!(compiled.kind(), kind);
}

#[test]
fn syntax_errors_carry_positions() {
    let error = Compiler::new()
        .compile("func Map(doc) {\n  emit(doc._id 1)\n}", None)
        .expect_err("missing comma");
    let CompileError::Compilation { diagnostic } = error else {
        panic!("expected a compilation error, got {error:?}");
    };
    let position = diagnostic.position().expect("position recorded");
    assert_eq!(position.line, 2);
}

#[test]
fn custom_profiles_narrow_the_host_surface() {
    let profile = HostProfile::new()
        .allow_all_types()
        .allow_function(HostFunction::Emit);
    let compiler = Compiler::new().with_profile(profile);
    let error = compiler
        .compile("func Map(doc) { log(doc) }", None)
        .expect_err("log is not granted");
    assert!(error.to_string().contains("`log` is not available"));
    assert!(compiler.compile("func Map(doc) { emit(1, 2) }", None).is_ok());
}

#[test]
fn call_depth_is_configurable() {
    let source = "func Map(doc) { emit(depth(0), 1) }\n\
                  func depth(n) { if n >= 10 { return n }\n return depth(n + 1) }";
    let shallow: MapFunction = Compiler::new()
        .with_max_call_depth(5)
        .compile_as(source)
        .expect("map compiles");
    let error = shallow
        .call(&json!({}), &mut no_logs())
        .expect_err("depth exceeded");
    assert!(matches!(error, InvocationError::Runtime { .. }));

    let deep: MapFunction = Compiler::new()
        .with_max_call_depth(32)
        .compile_as(source)
        .expect("map compiles");
    let emitted = deep.call(&json!({}), &mut no_logs()).expect("map runs");
    assert_eq!(emitted.pairs(), [(json!(10), json!(1))]);
}

#[test]
fn from_compiled_rejects_other_kinds() {
    let compiled = Compiler::new()
        .compile("func Filter(doc, req) { return true }", None)
        .expect("filter compiles");
    let error = MapFunction::from_compiled(compiled).expect_err("filters are not maps");
    assert_eq!(
        error,
        CompileError::SignatureMismatch {
            expected: FunctionKind::Map,
            found: FunctionKind::Filter,
        }
    );
}

#[test]
fn entry_cannot_take_more_parameters_than_supplied() {
    let error = Compiler::new()
        .compile("func Rewrite(req, extra) { return req }", None)
        .expect_err("too many parameters");
    assert!(error.to_string().contains("at most 1 parameter"));
}

#[test]
fn reduce_sees_keys_unless_rereducing() {
    let reduce: ReduceFunction = Compiler::new()
        .compile_as("func Reduce(keys, values, rereduce) { if rereduce { return nil }\n return len(keys) }")
        .expect("reduce compiles");
    let keys = [json!(["k", "id1"]), json!(["k", "id2"])];
    let values = [json!(1), json!(2)];
    let counted = reduce
        .call(Some(&keys), &values, false, &mut no_logs())
        .expect("reduce runs");
    assert_eq!(counted, json!(2));
    let rereduced = reduce
        .call(None, &values, true, &mut no_logs())
        .expect("rereduce runs");
    assert_eq!(rereduced, Json::Null);
}

#[rstest]
#[case("func Update(doc, req) { return doc }", "[doc, response]")]
#[case("func Update(doc, req) { return [doc] }", "exactly two elements")]
#[case("func Update(doc, req) { return [doc, 3] }", "string or an object")]
fn update_results_must_be_pairs(#[case] source: &str, #[case] expected: &str) {
    let update: UpdateFunction = Compiler::new().compile_as(source).expect("update compiles");
    let error = update
        .call(&json!({"_id": "a"}), &Request::default(), &mut no_logs())
        .expect_err("result shape is invalid");
    let InvocationError::InvalidResult { kind, message } = error else {
        panic!("expected an invalid result, got {error:?}");
    };
    assert_eq!(kind, FunctionKind::Update);
    assert!(message.contains(expected), "message was {message}");
}

#[test]
fn update_sees_the_request() {
    let update: UpdateFunction = Compiler::new()
        .compile_as("func Update(doc, req: Request) { return [nil, {code: 201, body: req.uuid}] }")
        .expect("update compiles");
    let request = Request {
        uuid: Some("u-1".to_owned()),
        ..Request::default()
    };
    let result = update
        .call(&Json::Null, &request, &mut no_logs())
        .expect("update runs");
    assert_eq!(result.document, Json::Null);
    assert_eq!(result.response, json!({"code": 201, "body": "u-1"}));
}

#[rstest]
#[case("func Rewrite(req) { return \"/db/_design/app/_view/\" + req.path[0] }", json!({"path": "/db/_design/app/_view/posts"}))]
#[case("func Rewrite(req) { return {path: \"/x\", query: req.query, code: 302} }", json!({"path": "/x", "query": {"page": 2}, "code": 302}))]
fn rewrites_describe_requests(#[case] source: &str, #[case] expected: Json) {
    let rewrite: RewriteFunction = Compiler::new().compile_as(source).expect("rewrite compiles");
    let request: Request = serde_json::from_value(json!({
        "path": ["posts"],
        "query": {"page": 2}
    }))
    .expect("request parses");
    let rewritten = rewrite
        .call(&request, &mut no_logs())
        .expect("rewrite runs");
    assert_eq!(rewritten, expected);
}

#[test]
fn rewrites_must_return_objects_or_paths() {
    let rewrite: RewriteFunction = Compiler::new()
        .compile_as("func Rewrite(req) { return 404 }")
        .expect("rewrite compiles");
    let error = rewrite
        .call(&Request::default(), &mut no_logs())
        .expect_err("numbers are not rewrites");
    assert!(matches!(error, InvocationError::InvalidResult { .. }));
}

#[test]
fn emitted_pairs_serialise_as_nested_arrays() {
    let map: MapFunction = Compiler::new()
        .compile_as("func Map(doc) { emit([doc.a, 1], {n: doc.a})\n emit(nil, nil) }")
        .expect("map compiles");
    let emitted = map
        .call(&json!({"a": "x"}), &mut no_logs())
        .expect("map runs");
    assert_eq!(
        serde_json::to_value(&emitted).expect("pairs encode"),
        json!([[["x", 1], {"n": "x"}], [null, null]])
    );
}
