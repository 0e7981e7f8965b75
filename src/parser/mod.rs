//! Rill Parser Module
//!
//! Parses a token stream into a [`Script`] AST. [`parse`] stops at the first
//! error; [`parse_with_recovery`] resynchronises at line boundaries and keeps
//! going, leaving `Statement::Error` placeholders behind.

mod ast;
mod expressions;
mod hints;
mod script_parser;

pub use ast::{
    Access, AnnotationArg, BinaryExpr, Capture, BinaryOp, Block, ClosureCall, ClosureDef, ClosureParam,
    CollectionExpr, CollectionKind, Conditional, DestructureElement, DestructurePattern,
    DictEntry, DictKey, DictLiteral, ErrorNode, ExistenceCheck, Expr, Frontmatter, HostCall,
    LoopExpr, MethodCall, PipeChain, PipeStep, PostfixExpr, PostfixOp, Script, SliceExpr,
    Statement, StringLiteral, StringSegment, Terminator, TupleLiteral, TypeOp, UnaryExpr,
    UnaryOp, VariableKind, VariableRef,
};
pub(crate) use hints::closest as closest_name;
pub use script_parser::{parse, parse_with_recovery, ParseOutcome, RillParser};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::RillType;

    fn chain(source: &str) -> PipeChain {
        let script = parse(source).unwrap();
        match script.statements.into_iter().next() {
            Some(Statement::Expression { chain, .. }) => chain,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn head(source: &str) -> Expr {
        *chain(source).head
    }

    #[test]
    fn test_pipe_chain_with_capture() {
        let parsed = chain("\"World\" -> greet -> $result");
        assert_eq!(parsed.steps.len(), 1);
        match &parsed.steps[0] {
            PipeStep::Target(Expr::HostCall(call)) => {
                assert_eq!(call.name, "greet");
                assert!(call.args.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
        match parsed.terminator {
            Some(Terminator::Capture(capture)) => assert_eq!(capture.name, "result"),
            other => panic!("unexpected terminator {:?}", other),
        }
    }

    #[test]
    fn test_capture_and_continue() {
        let parsed = chain("\"hi\" :> $greeting -> .upper");
        assert!(matches!(parsed.steps[0], PipeStep::Capture(_)));
        assert!(matches!(parsed.steps[1], PipeStep::Target(Expr::MethodCall(_))));
        assert!(parsed.terminator.is_none());
    }

    #[test]
    fn test_chain_continues_on_next_line() {
        let parsed = chain("\"a\"\n  -> .upper\n  -> $x");
        assert_eq!(parsed.steps.len(), 1);
        assert!(parsed.terminator.is_some());
    }

    #[test]
    fn test_statements_on_one_line() {
        let script = parse("1 -> $x  || ($x) :> $f").unwrap();
        assert_eq!(script.statements.len(), 2);
    }

    #[test]
    fn test_precedence() {
        match head("1 + 2 * 3") {
            Expr::Binary(bin) => {
                assert_eq!(bin.op, BinaryOp::Add);
                assert!(matches!(*bin.right, Expr::Binary(ref r) if r.op == BinaryOp::Mul));
            }
            other => panic!("unexpected {:?}", other),
        }
        match head("$a || $b && $c") {
            Expr::Binary(bin) => assert_eq!(bin.op, BinaryOp::Or),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_literal_folds() {
        assert!(matches!(head("-5"), Expr::Number { value, .. } if value == -5.0));
        assert!(matches!(head("-$x"), Expr::Unary(_)));
    }

    #[test]
    fn test_conditional_with_else_if() {
        let parsed = chain("\"\" -> .empty ? \"a\" ! $n > 1 ? \"b\" ! \"c\"");
        match &parsed.steps[0] {
            PipeStep::Target(Expr::Conditional(cond)) => {
                assert!(matches!(cond.condition.as_deref(), Some(Expr::MethodCall(_))));
                assert!(matches!(
                    cond.else_branch.as_deref(),
                    Some(Expr::Conditional(_))
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loop_forms() {
        let parsed = chain("$items -> @{ $ -> log }");
        match &parsed.steps[0] {
            PipeStep::Target(Expr::Loop(lp)) => {
                assert!(lp.input.is_none());
                assert!(lp.condition.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        match head("($x < 100) @ { $x -> double -> $x }") {
            Expr::Loop(lp) => assert!(matches!(lp.input.as_deref(), Some(Expr::Grouped { .. }))),
            other => panic!("unexpected {:?}", other),
        }

        match head("0 @ { $ + 1 } ? ($ < 3)") {
            Expr::Loop(lp) => assert!(lp.condition.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sequential_spread() {
        let parsed = chain("1 -> @[$inc, $double]");
        assert!(matches!(
            parsed.steps[0],
            PipeStep::Target(Expr::SequentialSpread { .. })
        ));
    }

    #[test]
    fn test_dict_versus_tuple() {
        assert!(matches!(head("[a: 1, b: 2]"), Expr::Dict(_)));
        assert!(matches!(head("[:]"), Expr::Dict(ref d) if d.entries.is_empty()));
        assert!(matches!(head("[]"), Expr::Tuple(ref t) if t.elements.is_empty()));
        assert!(matches!(head("[1, 2]"), Expr::Tuple(_)));
        assert!(matches!(head("[[1, 2], [3]]"), Expr::Tuple(_)));

        match head("[1: \"num\", \"1\": \"str\", [x, y]: \"either\", true: 0]") {
            Expr::Dict(dict) => {
                assert_eq!(dict.entries[0].key, DictKey::Number(1.0));
                assert_eq!(dict.entries[1].key, DictKey::Str("1".to_string()));
                assert_eq!(
                    dict.entries[2].key,
                    DictKey::Tuple(vec![
                        DictKey::Name("x".to_string()),
                        DictKey::Name("y".to_string())
                    ])
                );
                assert_eq!(dict.entries[3].key, DictKey::Bool(true));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_accumulator_prefix_detection() {
        match head("each(0) { $@ + $ }") {
            Expr::Collection(op) => {
                assert_eq!(op.kind, CollectionKind::Each);
                assert!(op.accumulator.is_some());
                assert!(matches!(*op.body, Expr::Block(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        match head("map ($ * 2)") {
            Expr::Collection(op) => {
                assert!(op.accumulator.is_none());
                assert!(matches!(*op.body, Expr::Grouped { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        match head("fold(0) |acc, x| { $acc + $x }") {
            Expr::Collection(op) => {
                assert!(op.accumulator.is_some());
                assert!(matches!(*op.body, Expr::Closure(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_variable_access_chain() {
        match head("$user.profile[0].name ?? \"anon\"") {
            Expr::Variable(var) => {
                assert_eq!(var.kind, VariableKind::Named("user".to_string()));
                assert_eq!(var.accesses.len(), 3);
                assert!(var.default.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }

        match head("$user.?email&string") {
            Expr::Variable(var) => {
                let check = var.existence.unwrap();
                assert_eq!(check.field, "email");
                assert_eq!(check.type_constraint, Some(RillType::String));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_method_call_ends_access_chain() {
        match head("$user.name.trim()") {
            Expr::Postfix(post) => {
                match &*post.base {
                    Expr::Variable(var) => assert_eq!(var.accesses.len(), 1),
                    other => panic!("unexpected base {:?}", other),
                }
                assert!(matches!(post.ops[0], PostfixOp::Method { ref name, .. } if name == "trim"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_closure_forms() {
        match head("|name: string, n: number = 1| { $name }") {
            Expr::Closure(def) => {
                assert_eq!(def.params.len(), 2);
                assert_eq!(def.params[0].type_annotation, Some(RillType::String));
                assert!(def.params[1].default.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        let parsed = chain("| | ($x) :> $f");
        match *parsed.head {
            Expr::Closure(ref def) => assert!(def.params.is_empty()),
            ref other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parsed.steps[0], PipeStep::Capture(_)));
    }

    #[test]
    fn test_extraction_targets() {
        let parsed = chain("$pair -> *<$a, _, key: $b:number, *<$c>>");
        match &parsed.steps[0] {
            PipeStep::Target(Expr::Destructure(pattern)) => {
                assert_eq!(pattern.elements.len(), 4);
                assert!(matches!(pattern.elements[1], DestructureElement::Skip(_)));
                assert!(matches!(pattern.elements[3], DestructureElement::Nested(_)));
            }
            other => panic!("unexpected {:?}", other),
        }

        match &chain("$xs -> /<1:>").steps[0] {
            PipeStep::Target(Expr::Slice(slice)) => {
                assert!(slice.start.is_some());
                assert!(slice.stop.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        match &chain("$xs -> /<::-1>").steps[0] {
            PipeStep::Target(Expr::Slice(slice)) => assert!(slice.step.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_operations() {
        let parsed = chain("$x -> :string -> :?list");
        assert!(matches!(parsed.steps[0], PipeStep::Target(Expr::TypeAssertion(_))));
        assert!(matches!(parsed.steps[1], PipeStep::Target(Expr::TypeCheck(_))));

        let err = parse("$x -> :integer").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownType);
    }

    #[test]
    fn test_interpolation_is_parsed() {
        match head("\"Hello, {$name}!\"") {
            Expr::Str(lit) => {
                assert_eq!(lit.segments.len(), 3);
                assert!(matches!(lit.segments[1], StringSegment::Interpolation(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        let err = parse("\"{1 2}\"").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInterpolation);
    }

    #[test]
    fn test_annotation() {
        let script = parse("^(limit: 5, doc: \"x\")\n$xs -> @{ $ }").unwrap();
        match &script.statements[0] {
            Statement::Annotated { annotations, .. } => {
                assert_eq!(annotations.len(), 2);
                assert_eq!(annotations[0].key, "limit");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_codes() {
        let err = parse("(1 + 2").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedEof);

        let err = parse("\"x\" = $y").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedToken);
        assert!(err.message().contains("->"));

        let err = parse("if $x { 1 }").unwrap_err();
        assert!(err.message().contains("? then ! else"));

        let err = parse("$xs -> fitler { $ }").unwrap_err();
        assert!(err.message().contains("`filter`"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let source = "^(limit: 3)\n[1, 2] -> map { $ * 2 } -> $doubled\n\"{$doubled}\"";
        assert_eq!(parse(source).unwrap(), parse(source).unwrap());
    }
}
