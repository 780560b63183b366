//! Recursion detection and analysis over builder-constructed grammars.

use wavefront::grammar::{Elem, FrontNode, Grammar, GrammarBuilder};
use wavefront::lexer::OpId;

fn expr_grammar() -> Grammar {
    GrammarBuilder::new()
        .rule(
            "Add",
            Elem::one_of([Elem::rule("Mul"), Elem::rule("AddTail")]),
        )
        .rule(
            "AddTail",
            Elem::concat([Elem::rule("Add"), Elem::op(OpId::Add), Elem::rule("Mul")]),
        )
        .rule(
            "Mul",
            Elem::one_of([Elem::rule("Id"), Elem::rule("MulTail")]),
        )
        .rule(
            "MulTail",
            Elem::concat([Elem::rule("Mul"), Elem::op(OpId::Mul), Elem::rule("Id")]),
        )
        .rule("Id", Elem::identifier())
        .top_rule("Add")
        .build()
        .unwrap()
}

#[test]
fn leads_are_detected() {
    let grammar = expr_grammar();
    let add = grammar.rule_named("Add").unwrap();
    let mul = grammar.rule_named("Mul").unwrap();
    let id = grammar.rule_named("Id").unwrap();

    let recursion = grammar.recursion();
    assert!(recursion.is_lead(add));
    assert!(recursion.is_lead(mul));
    assert!(!recursion.is_lead(id));
    assert!(!recursion.is_lead(grammar.rule_named("AddTail").unwrap()));
}

#[test]
fn recursion_nodes_cover_each_cycle() {
    let grammar = expr_grammar();
    let add = grammar.rule_named("Add").unwrap();
    let add_tail = grammar.rule_named("AddTail").unwrap();

    let rec = grammar.recursion().recursion_of(add).unwrap();
    assert_eq!(rec.cycles, vec![vec![1, 0]]);
    assert!(rec.is_node(add));
    assert!(rec.is_node(add_tail));
    assert_eq!(rec.nodes.len(), 2);
}

#[test]
fn lead_fronts_exit_the_recursion() {
    let grammar = expr_grammar();
    let add = grammar.rule_named("Add").unwrap();
    let mul = grammar.rule_named("Mul").unwrap();

    // Add's off-cycle child is Mul; matching can exit through it without
    // re-entering the recursion.
    let rec = grammar.recursion().recursion_of(add).unwrap();
    assert_eq!(rec.lead_fronts, vec![FrontNode::Rule(mul)]);
}

#[test]
fn cycle_fronts_carry_the_concat_tail() {
    let grammar = expr_grammar();
    let add = grammar.rule_named("Add").unwrap();
    let add_tail = grammar.rule_named("AddTail").unwrap();

    // The back edge leaves AddTail at child 0; the remaining "+ Mul" tail
    // extends an accepted match.
    let rec = grammar.recursion().recursion_of(add).unwrap();
    assert_eq!(
        rec.cycle_fronts,
        vec![vec![FrontNode::ConcatTail {
            rule: add_tail,
            start: 1
        }]]
    );
}

#[test]
fn groups_separate_independent_recursions() {
    let grammar = expr_grammar();
    let add = grammar.rule_named("Add").unwrap();
    let add_tail = grammar.rule_named("AddTail").unwrap();
    let mul = grammar.rule_named("Mul").unwrap();
    let mul_tail = grammar.rule_named("MulTail").unwrap();
    let id = grammar.rule_named("Id").unwrap();

    let recursion = grammar.recursion();
    assert!(recursion.in_same_group(add, add_tail));
    assert!(recursion.in_same_group(mul, mul_tail));
    assert!(!recursion.in_same_group(add, mul));
    assert!(recursion.group_of(id).is_none());
}

#[test]
fn mutual_recursion_merges_into_one_group() {
    // A : ONEOF(Id, B); B : ONEOF(A ',' Id as tail, A). Both cycles run
    // through A, so everything lands in one group.
    let grammar = GrammarBuilder::new()
        .rule("A", Elem::one_of([Elem::rule("Id"), Elem::rule("B")]))
        .rule(
            "B",
            Elem::one_of([Elem::rule("A"), Elem::rule("BTail")]),
        )
        .rule(
            "BTail",
            Elem::concat([Elem::rule("B"), Elem::op(OpId::Add), Elem::rule("Id")]),
        )
        .rule("Id", Elem::identifier())
        .top_rule("A")
        .build()
        .unwrap();

    let a = grammar.rule_named("A").unwrap();
    let b = grammar.rule_named("B").unwrap();
    let b_tail = grammar.rule_named("BTail").unwrap();

    let recursion = grammar.recursion();
    assert!(recursion.in_same_group(a, b));
    assert!(recursion.in_same_group(a, b_tail));
}

#[test]
fn non_recursive_grammar_has_no_groups() {
    let grammar = GrammarBuilder::new()
        .rule(
            "Pair",
            Elem::concat([Elem::identifier(), Elem::op(OpId::Add), Elem::identifier()]),
        )
        .top_rule("Pair")
        .build()
        .unwrap();

    let pair = grammar.rule_named("Pair").unwrap();
    let recursion = grammar.recursion();
    assert!(recursion.recursions().is_empty());
    assert!(recursion.group_of(pair).is_none());
}
