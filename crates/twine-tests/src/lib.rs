//! Integration tests for the twine compiler
//!
//! Drives the complete pipeline:
//! Source -> Lexer -> Parser -> TAC -> Codegen
//!
//! and, for accepted programs, runs the lowered IR on the reference
//! evaluator so tests can observe the program's printed output and its
//! allocation balance.

pub mod exec;

pub use exec::{run, Execution};

use twine_codegen::{CodeGen, Module};
use twine_error::Error;
use twine_lexer::tokenize;
use twine_parser::parse;
use twine_tac::Tac;

/// Result of compiling a twine source text
#[derive(Debug)]
pub struct CompileResult {
    /// The fatal error, if compilation stopped
    pub error: Option<Error>,
    /// TAC textual listing (if reached)
    pub tac_listing: Option<String>,
    /// Low-level IR listing (if reached)
    pub ir_listing: Option<String>,
    /// The lowered module (if reached)
    pub module: Option<Module>,
}

impl CompileResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(error: impl Into<Error>) -> Self {
        CompileResult {
            error: Some(error.into()),
            tac_listing: None,
            ir_listing: None,
            module: None,
        }
    }
}

/// Compiles twine source through the full pipeline
pub fn compile(source: &str) -> CompileResult {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(e) => return CompileResult::failed(e),
    };

    let program = match parse(tokens) {
        Ok(program) => program,
        Err(e) => return CompileResult::failed(e),
    };

    let tac = match Tac::generate(&program) {
        Ok(tac) => tac,
        Err(e) => return CompileResult::failed(e),
    };

    let module = match CodeGen::generate(&program) {
        Ok(module) => module,
        Err(e) => return CompileResult::failed(e),
    };

    CompileResult {
        error: None,
        tac_listing: Some(tac.to_string()),
        ir_listing: Some(module.to_string()),
        module: Some(module),
    }
}

/// Asserts that source compiles without errors
pub fn assert_compiles(source: &str) -> CompileResult {
    let result = compile(source);
    if let Some(error) = &result.error {
        panic!("Expected source to compile, but got: {error}");
    }
    result
}

/// Asserts that source fails to compile and returns the error
pub fn assert_compile_fails(source: &str) -> Error {
    let result = compile(source);
    match result.error {
        Some(error) => error,
        None => panic!("Expected source to fail compilation, but it succeeded"),
    }
}

/// Asserts that the TAC listing contains a specific string
pub fn assert_tac_contains(source: &str, expected: &str) {
    let result = assert_compiles(source);
    let listing = result.tac_listing.unwrap();
    if !listing.contains(expected) {
        panic!("Expected TAC to contain '{expected}', but it didn't.\n\nListing:\n{listing}");
    }
}

/// Asserts that the low-level IR listing contains a specific string
pub fn assert_ir_contains(source: &str, expected: &str) {
    let result = assert_compiles(source);
    let listing = result.ir_listing.unwrap();
    if !listing.contains(expected) {
        panic!("Expected IR to contain '{expected}', but it didn't.\n\nListing:\n{listing}");
    }
}

/// Compiles and runs a program on the reference evaluator
pub fn run_program(source: &str) -> Execution {
    let result = assert_compiles(source);
    exec::run(&result.module.unwrap())
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================
    // Accepted programs end to end
    // =========================================

    #[test]
    fn test_concat_then_repeat() {
        // `a` gets "ab"+"cd", `b` doubles it
        let execution = run_program("string a, b; a=\"ab\"+\"cd\"; b=a*2;");
        assert_eq!(execution.output, "a = abcd\nb = abcdabcd\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_ordering_is_length_based_not_lexicographic() {
        // "abc" < "de" lexicographically, but 3 > 2 wins here
        let execution = run_program(
            "string r; if (\"abc\" > \"de\") r=\"t\" else r=\"f\";",
        );
        assert_eq!(execution.output, "r = t\n");
    }

    #[test]
    fn test_ordering_through_variables() {
        // same comparison, but the lengths come from runtime scans
        let execution = run_program(
            "string a, b, r; a=\"abc\"; b=\"de\"; if (a > b) r=\"t\" else r=\"f\";",
        );
        assert_eq!(execution.output, "a = abc\nb = de\nr = t\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_repeat_zero_times_yields_empty_string() {
        let execution = run_program("string a; a=\"xyz\"*0;");
        assert_eq!(execution.output, "a = \n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_do_while_body_runs_at_least_once() {
        // the condition is false on entry, yet the body executed
        let execution = run_program("string a; a=\"\"; do a=a+\"x\" while (a <> a);");
        assert_eq!(execution.output, "a = x\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_do_while_loops_until_condition_fails() {
        let execution = run_program("string a; a=\"\"; do a=a+\"x\" while (a < \"xxx\");");
        assert_eq!(execution.output, "a = xxx\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_empty_string_equality() {
        // a=="" is true and a<>"" is false for an empty a
        let execution = run_program(
            "string a, e, n; a=\"\"; \
             if (a == \"\") e=\"t\" else e=\"f\"; \
             if (a <> \"\") n=\"t\" else n=\"f\";",
        );
        assert_eq!(execution.output, "a = \ne = t\nn = f\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_equality_compares_bytes() {
        let execution = run_program(
            "string a, b, r, s; a=\"abc\"; b=\"abd\"; \
             if (a == b) r=\"t\" else r=\"f\"; \
             if (a == \"abc\") s=\"t\" else s=\"f\";",
        );
        assert_eq!(execution.output, "a = abc\nb = abd\nr = f\ns = t\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_unassigned_variable_prints_null() {
        let execution = run_program("string a, b; a=\"x\";");
        assert_eq!(execution.output, "a = x\nb = <null>\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_parenthesized_repeat_distributes_over_concat() {
        let execution = run_program("string a; a=(\"ab\"+\"c\")*2;");
        assert_eq!(execution.output, "a = abcabc\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_self_assignment_copies_before_freeing() {
        // the old buffer must stay alive while the expression reads it
        let execution = run_program("string a; a=\"xy\"; a=a; a=a+a;");
        assert_eq!(execution.output, "a = xyxy\n");
        assert_eq!(execution.allocs, execution.frees);
    }

    #[test]
    fn test_ownership_balances_in_nested_control_flow() {
        let execution = run_program(
            "string a, b; a=\"x\"; b=\"\"; \
             do start \
               if (b >= a*2) a=a+b else b=b+\"yz\"; \
             end while (b < \"zzzzzz\");",
        );
        assert_eq!(execution.allocs, execution.frees);
    }

    // =========================================
    // Rejected programs
    // =========================================

    #[test]
    fn test_undeclared_variable_reference_stops_compilation() {
        let source = "string a; a=b+\"x\";";
        let error = assert_compile_fails(source);
        assert_eq!(error.message(), "Unknown identifier: b");
        assert_eq!(error.position(), 12);

        // nothing downstream is produced
        let result = compile(source);
        assert!(result.tac_listing.is_none());
        assert!(result.module.is_none());
    }

    #[test]
    fn test_lexical_error_stops_compilation() {
        let error = assert_compile_fails("string a; a=\"x\" ? \"y\";");
        assert!(matches!(error, Error::Lexical(_)));
        assert_eq!(error.message(), "Unrecognized character");
    }

    #[test]
    fn test_syntax_error_stops_compilation() {
        let error = assert_compile_fails("string a; a=;");
        assert_eq!(error.message(), "Expect IDENTIFIER, STRING or LEFT_BRACKET, got SEMICOLON");
        assert_eq!(error.position(), 12);
    }

    #[test]
    fn test_duplicate_declaration_is_rejected() {
        let error = assert_compile_fails("string a, a; a=\"x\";");
        assert_eq!(error.message(), "Variable is already defined: a");
    }

    // =========================================
    // IR artifacts
    // =========================================

    #[test]
    fn test_tac_listing_shape() {
        assert_tac_contains("string a; a=\"ab\"+\"cd\";", "(0) (+, ab, cd, T1)");
        assert_tac_contains("string a; a=\"ab\"+\"cd\";", "string T1 (temporary)");
    }

    #[test]
    fn test_tac_backpatching_resolves_every_label() {
        let source = "string a, b; \
                      if (a == b) start \
                        do a=a+\"x\" while (a < b); \
                      end else b=b*2; \
                      do start if (a <> b) a=b else b=a; end while (a == b);";
        let result = assert_compiles(source);
        let listing = result.tac_listing.unwrap();
        assert!(!listing.contains(&usize::MAX.to_string()));

        // a jump target must be a valid instruction index
        let program = twine_parser::parse_source(source).unwrap();
        let tac = twine_tac::Tac::generate(&program).unwrap();
        for instruction in &tac.instructions {
            if let twine_tac::Dest::Label(label) = &instruction.result {
                assert!(label.num <= tac.instructions.len());
            }
        }
    }

    #[test]
    fn test_ir_artifacts() {
        assert_ir_contains("string a; a=\"hi\";", "@str0 = \"hi\"");
        assert_ir_contains("string a; a=\"hi\";", "call @printf(");
        assert_ir_contains("string a; a=\"hi\";", "ret 0");
    }

    #[test]
    fn test_if_joins_at_a_single_exit_block() {
        let source = "string a; if (a == \"x\") start a=\"y\"; a=a+a; end else a=\"z\";";
        let result = assert_compiles(source);
        let listing = result.ir_listing.unwrap();
        assert_eq!(listing.matches("; if_cont").count(), 1);
        assert_eq!(listing.matches("; if_true").count(), 1);
        assert_eq!(listing.matches("; if_false").count(), 1);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let source = "string a, b; a=\"ab\"*3; do b=b+a while (b <= \"zzzz\");";
        let first = compile(source);
        let second = compile(source);
        assert_eq!(first.tac_listing, second.tac_listing);
        assert_eq!(first.ir_listing, second.ir_listing);
    }
}
