// tests/validator_tests.rs

use rexl_lang::output::from_json;
use rexl_lang::validator::{IssueCode, Severity, ValidateOptions, Validator};
use rexl_lang::{Grammar, Value};
use serde_json::json;

fn ctx(json: serde_json::Value) -> Value {
    from_json(&json)
}

fn has_code(result: &rexl_lang::ValidationResult, code: IssueCode) -> bool {
    result.issues.iter().any(|i| i.code == code)
}

// ============================================================================
// Structural Passes
// ============================================================================

#[test]
fn test_well_formed_expression_is_valid() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("age > 18 && name", None, &ValidateOptions::default());
    assert!(result.valid);
    assert!(result.issues.is_empty());
    assert!(result.ast.is_some());
}

#[test]
fn test_empty_and_whitespace_only_input() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    for source in ["", "   ", "\t\n"] {
        let result = validator.validate(source, None, &ValidateOptions::default());
        assert!(!result.valid, "Failed for {:?}", source);
        assert!(has_code(&result, IssueCode::EmptyExpression));
    }
}

#[test]
fn test_invalid_token_reports_position() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("2 # 3", None, &ValidateOptions::default());
    assert!(!result.valid);
    let issue = result.errors().next().unwrap();
    assert_eq!(issue.code, IssueCode::InvalidToken);
    assert_eq!(issue.position, Some(2));
}

#[test]
fn test_consecutive_operators() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("1 + * 2", None, &ValidateOptions::default());
    assert!(!result.valid);
    assert!(has_code(&result, IssueCode::ConsecutiveOperators));
}

#[test]
fn test_syntax_error() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("age + +", None, &ValidateOptions::default());
    assert!(!result.valid);
    assert!(has_code(&result, IssueCode::SyntaxError));
    assert!(result.ast.is_none());
}

#[test]
fn test_syntax_error_carries_a_position() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);

    // The offending token's offset in the trimmed source
    let unexpected = validator.validate("age + +", None, &ValidateOptions::default());
    let issue = unexpected
        .issues
        .iter()
        .find(|i| i.code == IssueCode::SyntaxError)
        .unwrap();
    assert_eq!(issue.position, Some(6));

    // A truncated expression points one past the consumed prefix
    let dangling = validator.validate("2 +", None, &ValidateOptions::default());
    let issue = dangling
        .issues
        .iter()
        .find(|i| i.code == IssueCode::SyntaxError)
        .unwrap();
    assert_eq!(issue.position, Some(3));
}

#[test]
fn test_trimming_is_semantically_invisible() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let padded = validator.validate("   age > 18   ", None, &ValidateOptions::default());
    let bare = validator.validate("age > 18", None, &ValidateOptions::default());
    assert_eq!(padded.valid, bare.valid);
    assert_eq!(padded.issues.len(), bare.issues.len());
}

// ============================================================================
// Semantic Pass
// ============================================================================

#[test]
fn test_unknown_function() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("unknownFn(1)", None, &ValidateOptions::default());
    assert!(!result.valid);
    let issue = result.errors().next().unwrap();
    assert_eq!(issue.code, IssueCode::UnknownFunction);
    assert!(issue.message.contains("unknownFn"));
}

#[test]
fn test_unknown_transform() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("1|nope", None, &ValidateOptions::default());
    assert!(!result.valid);
    assert!(has_code(&result, IssueCode::UnknownTransform));
}

#[test]
fn test_allow_lists_suppress_unknown_names() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let options = ValidateOptions {
        custom_functions: vec!["unknownFn".to_string()],
        custom_transforms: vec!["nope".to_string()],
        ..ValidateOptions::default()
    };
    assert!(validator.validate("unknownFn(1)", None, &options).valid);
    assert!(validator.validate("1|nope", None, &options).valid);
}

#[test]
fn test_registered_names_pass() {
    let mut grammar = Grammar::default();
    grammar.add_function("known", |_| Ok(Value::Null));
    grammar.add_transform("upper", |args| {
        Ok(Value::String(args[0].as_string().to_uppercase()))
    });
    let validator = Validator::new(&grammar);
    assert!(validator.is_valid("known(1)"));
    assert!(validator.is_valid("'x'|upper"));
}

// ============================================================================
// Context Pass
// ============================================================================

#[test]
fn test_context_pass_flags_missing_properties() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let context = ctx(json!({"user": {"name": "Lana"}}));
    let options = ValidateOptions {
        allow_undefined_context: false,
        ..ValidateOptions::default()
    };

    let ok = validator.validate("user.name", Some(&context), &options);
    assert!(ok.valid);
    assert_eq!(ok.warnings().count(), 0);

    let missing = validator.validate("user.missing", Some(&context), &options);
    // Warnings never invalidate
    assert!(missing.valid);
    assert!(has_code(&missing, IssueCode::UndefinedProperty));
}

#[test]
fn test_context_pass_null_and_non_object_access() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let context = ctx(json!({"a": null, "user": {"name": "Lana"}}));
    let options = ValidateOptions {
        allow_undefined_context: false,
        ..ValidateOptions::default()
    };

    let through_null = validator.validate("a.b", Some(&context), &options);
    assert!(has_code(&through_null, IssueCode::NullPropertyAccess));

    let through_string = validator.validate("user.name.length", Some(&context), &options);
    assert!(has_code(&through_string, IssueCode::NonObjectPropertyAccess));
}

#[test]
fn test_missing_root_warns_once_per_chain() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let context = ctx(json!({}));
    let options = ValidateOptions {
        allow_undefined_context: false,
        ..ValidateOptions::default()
    };
    // One chain, one warning, however many links it has
    let result = validator.validate("a.b.c", Some(&context), &options);
    assert!(result.valid);
    assert_eq!(result.warnings().count(), 1);
    assert!(has_code(&result, IssueCode::UndefinedProperty));
}

#[test]
fn test_context_pass_skips_dynamic_subtrees() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let context = ctx(json!({"users": [{"name": "A"}]}));
    let options = ValidateOptions {
        allow_undefined_context: false,
        ..ValidateOptions::default()
    };
    // The filter's runtime shape is unknowable; no warning for .name
    let result = validator.validate("users[0].name", Some(&context), &options);
    assert!(result.valid);
    assert_eq!(result.warnings().count(), 0);
}

#[test]
fn test_warnings_can_be_filtered_out() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let context = ctx(json!({}));
    let options = ValidateOptions {
        allow_undefined_context: false,
        include_warnings: false,
        ..ValidateOptions::default()
    };
    let result = validator.validate("ghost", Some(&context), &options);
    assert!(result.valid);
    assert!(result.issues.is_empty());
}

// ============================================================================
// Heuristics
// ============================================================================

#[test]
fn test_max_depth_warning() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let options = ValidateOptions {
        max_depth: Some(2),
        ..ValidateOptions::default()
    };
    let result = validator.validate("1 + 2 + 3", None, &options);
    assert!(result.valid);
    assert!(has_code(&result, IssueCode::MaxDepthExceeded));
}

#[test]
fn test_max_length_warning() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let options = ValidateOptions {
        max_length: Some(5),
        ..ValidateOptions::default()
    };
    let result = validator.validate("1 + 2 + 3", None, &options);
    assert!(result.valid);
    assert!(has_code(&result, IssueCode::MaxLengthExceeded));
}

#[test]
fn test_node_count_info_is_opt_in() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let silent = validator.validate("1 + 2", None, &ValidateOptions::default());
    assert_eq!(silent.info().count(), 0);

    let options = ValidateOptions {
        include_info: true,
        ..ValidateOptions::default()
    };
    let chatty = validator.validate("1 + 2", None, &options);
    let info = chatty.info().next().unwrap();
    assert_eq!(info.code, IssueCode::NodeCount);
    assert_eq!(info.severity, Severity::Info);
}

// ============================================================================
// Facade Helpers
// ============================================================================

#[test]
fn test_is_valid() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    assert!(validator.is_valid("2 + 2"));
    assert!(!validator.is_valid("2 +"));
}

#[test]
fn test_first_error_in_positional_order() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let issue = validator.first_error("2 # 3").unwrap();
    assert_eq!(issue.code, IssueCode::InvalidToken);
    assert!(validator.first_error("2 + 2").is_none());
}

#[test]
fn test_issues_sorted_by_position() {
    let grammar = Grammar::default();
    let validator = Validator::new(&grammar);
    let result = validator.validate("1 + * 2", None, &ValidateOptions::default());
    let positions: Vec<Option<usize>> = result.issues.iter().map(|i| i.position).collect();
    let mut sorted = positions.clone();
    sorted.sort_by_key(|p| p.unwrap_or(usize::MAX));
    assert_eq!(positions, sorted);
}
