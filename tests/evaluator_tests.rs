// tests/evaluator_tests.rs

use std::sync::atomic::{AtomicBool, Ordering};

use rexl_lang::evaluator::EvalError;
use rexl_lang::output::from_json;
use rexl_lang::{Error, Rexl, Value};
use serde_json::json;

fn ctx(json: serde_json::Value) -> Value {
    from_json(&json)
}

async fn eval(source: &str) -> Result<Value, Error> {
    Rexl::new().eval(source, &Value::Null).await
}

async fn eval_with(source: &str, context: &Value) -> Result<Value, Error> {
    Rexl::new().eval(source, context).await
}

// ============================================================================
// Arithmetic
// ============================================================================

#[tokio::test]
async fn test_precedence() {
    assert_eq!(eval("2 + 3 * 4").await.unwrap(), Value::Integer(14));
    assert_eq!(eval("(2 + 3) * 4").await.unwrap(), Value::Integer(20));
}

#[tokio::test]
async fn test_negative_numbers() {
    assert_eq!(eval("3 - 1").await.unwrap(), Value::Integer(2));
    assert_eq!(eval("3 - -1").await.unwrap(), Value::Integer(4));
    assert_eq!(eval("-1 + 2").await.unwrap(), Value::Integer(1));
}

#[tokio::test]
async fn test_division_keeps_integers_when_exact() {
    assert_eq!(eval("10 / 5").await.unwrap(), Value::Integer(2));
    assert_eq!(eval("10 / 4").await.unwrap(), Value::Float(2.5));
}

#[tokio::test]
async fn test_division_by_zero() {
    assert_eq!(
        eval("1 / 0").await,
        Err(Error::Eval(EvalError::DivisionByZero))
    );
}

#[tokio::test]
async fn test_floor_division_and_modulo() {
    assert_eq!(eval("7 // 2").await.unwrap(), Value::Integer(3));
    assert_eq!(eval("-7 // 2").await.unwrap(), Value::Integer(-4));
    assert_eq!(eval("7 % 4").await.unwrap(), Value::Integer(3));
}

#[tokio::test]
async fn test_power() {
    assert_eq!(eval("2 ^ 10").await.unwrap(), Value::Integer(1024));
}

#[tokio::test]
async fn test_mixed_arithmetic_collapses_whole_results() {
    assert_eq!(eval("2 * 0.5").await.unwrap(), Value::Integer(1));
    assert_eq!(eval("1 + 0.5").await.unwrap(), Value::Float(1.5));
}

#[tokio::test]
async fn test_adding_booleans_is_a_type_error() {
    assert!(matches!(
        eval("true + false").await,
        Err(Error::Eval(EvalError::Type(_)))
    ));
}

// ============================================================================
// Strings, Comparisons, Logic
// ============================================================================

#[tokio::test]
async fn test_string_concatenation() {
    assert_eq!(
        eval(r#""Sterling" + " " + "Archer""#).await.unwrap(),
        Value::String("Sterling Archer".to_string())
    );
}

#[tokio::test]
async fn test_comparisons() {
    assert_eq!(eval("2 < 3").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval("'a' < 'b'").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval("2 == 2.0").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval("1 != 2").await.unwrap(), Value::Boolean(true));
}

#[tokio::test]
async fn test_in_operator() {
    assert_eq!(eval("'ar' in 'Archer'").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval("3 in [1, 2, 3]").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval("4 in [1, 2, 3]").await.unwrap(), Value::Boolean(false));
}

#[tokio::test]
async fn test_logic_returns_the_deciding_value() {
    assert_eq!(eval("true && false").await.unwrap(), Value::Boolean(false));
    assert_eq!(
        eval("false || 'fallback'").await.unwrap(),
        Value::String("fallback".to_string())
    );
    assert_eq!(eval("0 && 'never'").await.unwrap(), Value::Integer(0));
}

#[tokio::test]
async fn test_not() {
    assert_eq!(eval("!true").await.unwrap(), Value::Boolean(false));
    assert_eq!(eval("!''").await.unwrap(), Value::Boolean(true));
}

// ============================================================================
// Conditionals
// ============================================================================

#[tokio::test]
async fn test_ternary() {
    let context = ctx(json!({"age": 17}));
    assert_eq!(
        eval_with(r#"age >= 18 ? "adult" : "minor""#, &context)
            .await
            .unwrap(),
        Value::String("minor".to_string())
    );
}

#[tokio::test]
async fn test_elvis_with_falsy_empty_string() {
    let context = ctx(json!({"name": ""}));
    assert_eq!(
        eval_with(r#"name ?: "Anon""#, &context).await.unwrap(),
        Value::String("Anon".to_string())
    );
    let context = ctx(json!({"name": "Pam"}));
    assert_eq!(
        eval_with(r#"name ?: "Anon""#, &context).await.unwrap(),
        Value::String("Pam".to_string())
    );
}

// ============================================================================
// Identifiers and Property Access
// ============================================================================

#[tokio::test]
async fn test_property_chain() {
    let context = ctx(json!({"name": {"first": "Malory"}}));
    assert_eq!(
        eval_with("name.first", &context).await.unwrap(),
        Value::String("Malory".to_string())
    );
}

#[tokio::test]
async fn test_missing_key_is_undefined_null_stays_null() {
    let context = ctx(json!({"a": null}));
    assert_eq!(eval_with("ghost", &context).await.unwrap(), Value::Undefined);
    assert_eq!(eval_with("ghost.deep", &context).await.unwrap(), Value::Undefined);
    assert_eq!(eval_with("a.b", &context).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_chain_through_array_maps_over_elements() {
    let context = ctx(json!({"users": [{"name": "A"}, {"name": "B"}]}));
    assert_eq!(
        eval_with("users.name", &context).await.unwrap(),
        Value::Array(vec![
            Value::String("A".to_string()),
            Value::String("B".to_string())
        ])
    );
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_static_index() {
    let context = ctx(json!({"arr": [10, 20, 30]}));
    assert_eq!(eval_with("arr[1]", &context).await.unwrap(), Value::Integer(20));
    assert_eq!(eval_with("arr[-1]", &context).await.unwrap(), Value::Integer(30));
    assert_eq!(eval_with("arr[9]", &context).await.unwrap(), Value::Undefined);
}

#[tokio::test]
async fn test_dynamic_key() {
    let context = ctx(json!({"obj": {"ab": 42}}));
    assert_eq!(
        eval_with(r#"obj["a" + "b"]"#, &context).await.unwrap(),
        Value::Integer(42)
    );
}

#[tokio::test]
async fn test_relative_filter_keeps_matching_elements() {
    let context = ctx(json!({
        "users": [
            {"name": "A", "age": 30},
            {"name": "B", "age": 20}
        ]
    }));
    assert_eq!(
        eval_with("users[.age > 25].name", &context).await.unwrap(),
        Value::Array(vec![Value::String("A".to_string())])
    );
    assert_eq!(
        eval_with("users[.age > 0].name", &context).await.unwrap(),
        Value::Array(vec![
            Value::String("A".to_string()),
            Value::String("B".to_string())
        ])
    );
}

#[tokio::test]
async fn test_relative_filter_coerces_subject() {
    let context = ctx(json!({"single": {"age": 30}}));
    // Scalar subject becomes a singleton array
    assert_eq!(
        eval_with("single[.age > 25]", &context).await.unwrap(),
        ctx(json!([{"age": 30}]))
    );
    // Undefined subject becomes an empty array
    assert_eq!(
        eval_with("ghost[.age > 25]", &context).await.unwrap(),
        Value::Array(vec![])
    );
}

#[tokio::test]
async fn test_boolean_key_keeps_or_drops_subject() {
    let context = ctx(json!({"arr": [1, 2]}));
    assert_eq!(
        eval_with("arr[1 == 1]", &context).await.unwrap(),
        ctx(json!([1, 2]))
    );
    assert_eq!(
        eval_with("arr[1 == 2]", &context).await.unwrap(),
        Value::Undefined
    );
}

// ============================================================================
// Container Literals
// ============================================================================

#[tokio::test]
async fn test_array_and_object_literals_evaluate_members() {
    let context = ctx(json!({"count": 5}));
    assert_eq!(
        eval_with("[1, count * 2]", &context).await.unwrap(),
        ctx(json!([1, 10]))
    );
    assert_eq!(
        eval_with("{double: count * 2, label: 'n'}", &context)
            .await
            .unwrap(),
        ctx(json!({"double": 10, "label": "n"}))
    );
}

// ============================================================================
// Functions and Transforms
// ============================================================================

#[tokio::test]
async fn test_function_call() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_function("larger", |args| {
        let a = args[0].as_float().unwrap_or(f64::NEG_INFINITY);
        let b = args[1].as_float().unwrap_or(f64::NEG_INFINITY);
        Ok(if a >= b { args[0].clone() } else { args[1].clone() })
    });
    assert_eq!(
        rexl.eval("larger(3, 9)", &Value::Null).await.unwrap(),
        Value::Integer(9)
    );
}

#[tokio::test]
async fn test_namespaced_function() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_function("String.upper", |args| {
        Ok(Value::String(args[0].as_string().to_uppercase()))
    });
    assert_eq!(
        rexl.eval("String.upper('abc')", &Value::Null).await.unwrap(),
        Value::String("ABC".to_string())
    );
}

#[tokio::test]
async fn test_transform_pipeline() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_transform("upper", |args| {
        Ok(Value::String(args[0].as_string().to_uppercase()))
    });
    rexl.grammar_mut().add_transform("exclaim", |args| {
        Ok(Value::String(format!("{}!", args[0].as_string())))
    });
    assert_eq!(
        rexl.eval("'hello'|upper|exclaim", &Value::Null).await.unwrap(),
        Value::String("HELLO!".to_string())
    );
}

#[tokio::test]
async fn test_transform_with_extra_args() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_transform("plus", |args| {
        let a = args[0].as_int().unwrap_or(0);
        let b = args[1].as_int().unwrap_or(0);
        Ok(Value::Integer(a + b))
    });
    assert_eq!(
        rexl.eval("5|plus(3)", &Value::Null).await.unwrap(),
        Value::Integer(8)
    );
}

#[tokio::test]
async fn test_async_function() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_async_function("echo", |args| {
        Box::pin(async move { Ok(args.into_iter().next().unwrap_or(Value::Undefined)) })
    });
    assert_eq!(
        rexl.eval("echo(7) + 1", &Value::Null).await.unwrap(),
        Value::Integer(8)
    );
}

#[tokio::test]
async fn test_unknown_function_names_the_offender() {
    assert_eq!(
        eval("nope(1)").await,
        Err(Error::Eval(EvalError::UnknownFunction("nope".to_string())))
    );
}

#[tokio::test]
async fn test_unknown_transform_names_the_offender() {
    assert_eq!(
        eval("1|nope").await,
        Err(Error::Eval(EvalError::UnknownTransform("nope".to_string())))
    );
}

// ============================================================================
// Short-Circuit Contract
// ============================================================================

#[tokio::test]
async fn test_right_side_never_runs_when_left_decides() {
    static CALLED: AtomicBool = AtomicBool::new(false);
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_transform("spy", |args| {
        CALLED.store(true, Ordering::SeqCst);
        Ok(args.into_iter().next().unwrap_or(Value::Undefined))
    });
    assert_eq!(
        rexl.eval("false && (1|spy)", &Value::Null).await.unwrap(),
        Value::Boolean(false)
    );
    assert!(!CALLED.load(Ordering::SeqCst));

    // And it does run when the left side is truthy
    assert_eq!(
        rexl.eval("true && (1|spy)", &Value::Null).await.unwrap(),
        Value::Integer(1)
    );
    assert!(CALLED.load(Ordering::SeqCst));
}

// ============================================================================
// Grammar Mutation
// ============================================================================

#[tokio::test]
async fn test_removed_operator_fails_evaluation() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().remove_op("^");
    let err = rexl.eval("2 ^ 2", &Value::Null).await.unwrap_err();
    assert!(err.to_string().contains("^"));
}

#[tokio::test]
async fn test_custom_binary_operator() {
    let mut rexl = Rexl::new();
    rexl.grammar_mut().add_binary_op("~=", 20, |l, r| {
        Ok(Value::Boolean(
            l.as_string().to_lowercase() == r.as_string().to_lowercase(),
        ))
    });
    assert_eq!(
        rexl.eval("'ABC' ~= 'abc'", &Value::Null).await.unwrap(),
        Value::Boolean(true)
    );
}
