use std::collections::VecDeque;

use super::*;
use crate::{
    frontend::ast::{GlobalVariable, Parameter, Program},
    middle::{
        rtl::{Callable, interpreter},
        type_checking::type_check_program,
    },
};

fn var(name: &str) -> Expression {
    Expression::variable(name)
}

fn int(value: i64) -> Expression {
    Expression::int(value)
}

fn binary(lhs: Expression, operator: BinaryOperatorKind, rhs: Expression) -> Expression {
    Expression::binary(lhs, operator, rhs)
}

fn main_with(statements: Vec<Statement>) -> ast::Callable {
    ast::Callable::procedure("main", vec![], Block::new(statements))
}

fn lower(globals: Vec<GlobalVariable>, callables: Vec<ast::Callable>) -> rtl::Program {
    let mut program = Program::new(globals, callables).expect("valid program");
    let checked = type_check_program(&mut program).expect("program type checks");

    let mut context = GenerationContext::new();
    lower_program(&mut context, checked)
}

fn run(globals: Vec<GlobalVariable>, callables: Vec<ast::Callable>) -> Vec<String> {
    let execution = interpreter::run(&lower(globals, callables));
    assert!(!execution.panicked, "program panicked: {:?}", execution.output);
    execution.output
}

fn run_main(statements: Vec<Statement>) -> Vec<String> {
    run(vec![], vec![main_with(statements)])
}

fn callable<'a>(program: &'a rtl::Program, name: &str) -> &'a Callable {
    program
        .callable(InternedSymbol::new(name))
        .expect("callable was lowered")
}

fn count(callable: &Callable, predicate: impl Fn(&Instruction) -> bool) -> usize {
    callable
        .scheduled()
        .filter(|(_, instruction)| predicate(instruction))
        .count()
}

/// `side(v)` prints `v` and returns true
fn side_effect() -> ast::Callable {
    ast::Callable::function(
        "side",
        vec![Parameter::new("v", Type::Int64)],
        Type::Bool,
        Block::new(vec![
            Statement::Print(var("v")),
            Statement::Return(Some(Expression::boolean(true))),
        ]),
    )
}

#[test]
fn arithmetic_declaration_prints_fourteen() {
    let output = run_main(vec![
        Statement::declare(
            "x",
            Type::Int64,
            Some(binary(
                int(2),
                BinaryOperatorKind::Add,
                binary(int(3), BinaryOperatorKind::Multiply, int(4)),
            )),
        ),
        Statement::Print(var("x")),
    ]);

    assert_eq!(output, vec!["14"]);
}

#[test]
fn if_else_takes_only_the_true_branch() {
    let output = run_main(vec![Statement::if_else(
        binary(int(1), BinaryOperatorKind::LessThan, int(2)),
        Block::new(vec![Statement::Print(Expression::boolean(true))]),
        Some(Block::new(vec![Statement::Print(Expression::boolean(false))])),
    )]);

    assert_eq!(output, vec!["true"]);
}

#[test]
fn seventh_argument_travels_on_the_stack() {
    let names = ["a", "b", "c", "d", "e", "f", "g"];

    // a + 2b + 3c + ... + 7g
    let weighted = names
        .iter()
        .enumerate()
        .map(|(i, name)| binary(int(i as i64 + 1), BinaryOperatorKind::Multiply, var(name)))
        .reduce(|lhs, rhs| binary(lhs, BinaryOperatorKind::Add, rhs))
        .expect("seven terms");

    let sum7 = ast::Callable::function(
        "sum7",
        names.iter().map(|name| Parameter::new(name, Type::Int64)).collect(),
        Type::Int64,
        Block::new(vec![Statement::Return(Some(weighted))]),
    );

    let main = main_with(vec![Statement::Print(Expression::call(
        "sum7",
        (1..=7).map(|i| int(i * 10)).collect(),
    ))]);

    let program = lower(vec![], vec![sum7, main]);

    let callee = callable(&program, "sum7");
    assert_eq!(
        count(callee, |i| matches!(
            i,
            Instruction::LoadParameter { slot: 0, .. }
        )),
        1
    );
    assert_eq!(
        count(callee, |i| matches!(
            i,
            Instruction::CopyFromMachine { source, .. } if ARGUMENT_REGISTERS.contains(source)
        )),
        6
    );

    // One stack argument plus one word of padding
    let caller = callable(&program, "main");
    assert_eq!(count(caller, |i| matches!(i, Instruction::Push { .. })), 2);

    let execution = interpreter::run(&program);
    assert_eq!(execution.output, vec!["1400"]);
}

#[test]
fn eight_arguments_need_no_padding() {
    let names = ["a", "b", "c", "d", "e", "f", "g", "h"];

    let last_minus_first = ast::Callable::function(
        "last_minus_first",
        names.iter().map(|name| Parameter::new(name, Type::Int64)).collect(),
        Type::Int64,
        Block::new(vec![Statement::Return(Some(binary(
            var("h"),
            BinaryOperatorKind::Subtract,
            var("a"),
        )))]),
    );

    let main = main_with(vec![Statement::Print(Expression::call(
        "last_minus_first",
        (1..=8).map(int).collect(),
    ))]);

    let program = lower(vec![], vec![last_minus_first, main]);

    assert_eq!(
        count(callable(&program, "main"), |i| matches!(
            i,
            Instruction::Push { .. }
        )),
        2
    );
    assert_eq!(interpreter::run(&program).output, vec!["7"]);
}

#[test]
fn logical_and_short_circuits() {
    let output = run(
        vec![],
        vec![
            side_effect(),
            main_with(vec![
                Statement::declare("b", Type::Bool, Some(Expression::boolean(false))),
                Statement::if_else(
                    binary(
                        var("b"),
                        BinaryOperatorKind::LogicalAnd,
                        Expression::call("side", vec![int(1)]),
                    ),
                    Block::new(vec![Statement::Print(int(100))]),
                    None,
                ),
                Statement::Print(int(2)),
            ]),
        ],
    );

    assert_eq!(output, vec!["2"]);
}

#[test]
fn logical_or_short_circuits() {
    let output = run(
        vec![],
        vec![
            side_effect(),
            main_with(vec![
                Statement::declare(
                    "b",
                    Type::Bool,
                    Some(binary(
                        Expression::call("side", vec![int(1)]),
                        BinaryOperatorKind::LogicalOr,
                        Expression::call("side", vec![int(2)]),
                    )),
                ),
                Statement::Print(var("b")),
            ]),
        ],
    );

    assert_eq!(output, vec!["1", "true"]);
}

#[test]
fn boolean_values_are_intified() {
    let output = run_main(vec![
        Statement::declare(
            "b",
            Type::Bool,
            Some(binary(
                binary(int(1), BinaryOperatorKind::LessThan, int(2)),
                BinaryOperatorKind::LogicalAnd,
                Expression::unary(
                    UnaryOperatorKind::LogicalNot,
                    binary(int(3), BinaryOperatorKind::Equals, int(4)),
                ),
            )),
        ),
        Statement::Print(var("b")),
        Statement::Print(binary(
            var("b"),
            BinaryOperatorKind::Equals,
            Expression::boolean(false),
        )),
        Statement::Print(Expression::unary(UnaryOperatorKind::LogicalNot, var("b"))),
    ]);

    assert_eq!(output, vec!["true", "false", "false"]);
}

#[test]
fn while_loop_counts_down() {
    let output = run_main(vec![
        Statement::declare("i", Type::Int64, Some(int(3))),
        Statement::while_loop(
            binary(var("i"), BinaryOperatorKind::GreaterThan, int(0)),
            Block::new(vec![
                Statement::Print(var("i")),
                Statement::assign(var("i"), binary(var("i"), BinaryOperatorKind::Subtract, int(1))),
            ]),
        ),
    ]);

    assert_eq!(output, vec!["3", "2", "1"]);
}

#[test]
fn operators_follow_machine_semantics() {
    let output = run_main(vec![
        Statement::declare("x", Type::Int64, Some(int(-7))),
        Statement::Print(binary(var("x"), BinaryOperatorKind::Divide, int(2))),
        Statement::Print(binary(var("x"), BinaryOperatorKind::Modulus, int(2))),
        Statement::Print(Expression::unary(UnaryOperatorKind::Negate, var("x"))),
        Statement::Print(Expression::unary(UnaryOperatorKind::BitwiseNot, var("x"))),
        Statement::Print(binary(int(1), BinaryOperatorKind::ShiftLeft, int(4))),
        Statement::Print(binary(var("x"), BinaryOperatorKind::ShiftRight, int(1))),
        Statement::Print(binary(int(12), BinaryOperatorKind::BitwiseXor, int(10))),
        // The left operand is copied before the operation
        Statement::Print(var("x")),
    ]);

    assert_eq!(output, vec!["-3", "-1", "7", "6", "16", "-4", "6", "-7"]);
}

#[test]
fn recursion() {
    let factorial = ast::Callable::function(
        "factorial",
        vec![Parameter::new("n", Type::Int64)],
        Type::Int64,
        Block::new(vec![
            Statement::if_else(
                binary(var("n"), BinaryOperatorKind::LessThanOrEqualTo, int(1)),
                Block::new(vec![Statement::Return(Some(int(1)))]),
                None,
            ),
            Statement::Return(Some(binary(
                var("n"),
                BinaryOperatorKind::Multiply,
                Expression::call(
                    "factorial",
                    vec![binary(var("n"), BinaryOperatorKind::Subtract, int(1))],
                ),
            ))),
        ]),
    );

    let output = run(
        vec![],
        vec![
            factorial,
            main_with(vec![Statement::Print(Expression::call(
                "factorial",
                vec![int(10)],
            ))]),
        ],
    );

    assert_eq!(output, vec!["3628800"]);
}

#[test]
fn globals_are_shared_between_callables() {
    let bump = ast::Callable::procedure(
        "bump",
        vec![],
        Block::new(vec![Statement::assign(
            var("counter"),
            binary(var("counter"), BinaryOperatorKind::Add, int(1)),
        )]),
    );

    let program = lower(
        vec![
            GlobalVariable::new("counter", Type::Int64, int(10)),
            GlobalVariable::new("flag", Type::Bool, Expression::boolean(true)),
        ],
        vec![
            bump,
            main_with(vec![
                Statement::Eval(Expression::call("bump", vec![])),
                Statement::Eval(Expression::call("bump", vec![])),
                Statement::Print(var("counter")),
                Statement::Print(var("flag")),
            ]),
        ],
    );

    assert_eq!(program.globals[0].initial_value, 10);
    assert_eq!(program.globals[1].initial_value, 1);
    assert_eq!(program.globals[1].offset, 8);
    assert_eq!(interpreter::run(&program).output, vec!["12", "true"]);
}

#[test]
fn address_taken_locals_live_in_the_frame() {
    let program = lower(
        vec![],
        vec![main_with(vec![
            Statement::declare("x", Type::Int64, Some(int(1))),
            Statement::declare(
                "p",
                Type::pointer_to(Type::Int64),
                Some(Expression::address_of(var("x"))),
            ),
            Statement::assign(Expression::dereference(var("p")), int(5)),
            Statement::Print(var("x")),
        ])],
    );

    assert_eq!(callable(&program, "main").frame_size(), 8);
    assert_eq!(interpreter::run(&program).output, vec!["5"]);
}

#[test]
fn lists_are_cleared_and_grow_upward() {
    let list = Type::list_of(Type::Int64, 4);

    let output = run_main(vec![
        Statement::declare("a", list, Some(int(0))),
        Statement::declare("i", Type::Int64, Some(int(1))),
        Statement::while_loop(
            binary(var("i"), BinaryOperatorKind::LessThan, int(4)),
            Block::new(vec![
                Statement::assign(
                    Expression::index(var("a"), var("i")),
                    binary(
                        Expression::index(
                            var("a"),
                            binary(var("i"), BinaryOperatorKind::Subtract, int(1)),
                        ),
                        BinaryOperatorKind::Add,
                        var("i"),
                    ),
                ),
                Statement::assign(var("i"), binary(var("i"), BinaryOperatorKind::Add, int(1))),
            ]),
        ),
        Statement::Print(Expression::index(var("a"), int(0))),
        Statement::Print(Expression::index(var("a"), int(3))),
    ]);

    assert_eq!(output, vec!["0", "6"]);
}

#[test]
fn lists_pass_through_pointers() {
    let list = Type::list_of(Type::Int64, 3);

    let fill = ast::Callable::procedure(
        "fill",
        vec![Parameter::new("p", Type::pointer_to(list.clone()))],
        Block::new(vec![Statement::assign(
            Expression::index(Expression::dereference(var("p")), int(2)),
            int(42),
        )]),
    );

    let main = main_with(vec![
        Statement::declare("a", list, None),
        Statement::Eval(Expression::call(
            "fill",
            vec![Expression::address_of(var("a"))],
        )),
        Statement::Print(Expression::index(var("a"), int(2))),
        Statement::Print(Expression::index(var("a"), int(1))),
    ]);

    assert_eq!(run(vec![], vec![fill, main]), vec!["42", "0"]);
}

#[test]
fn out_of_bounds_index_panics() {
    let program = lower(
        vec![],
        vec![main_with(vec![
            Statement::declare("a", Type::list_of(Type::Int64, 2), None),
            Statement::Print(int(1)),
            Statement::Print(Expression::index(var("a"), int(2))),
            Statement::Print(int(3)),
        ])],
    );

    let execution = interpreter::run(&program);

    assert!(execution.panicked);
    assert_eq!(execution.output, vec!["1"]);
}

#[test]
fn alloc_returns_zeroed_heap_memory() {
    let output = run_main(vec![
        Statement::declare(
            "p",
            Type::pointer_to(Type::Int64),
            Some(Expression::alloc(Type::Int64, int(3))),
        ),
        Statement::Print(Expression::dereference(var("p"))),
        Statement::assign(Expression::dereference(var("p")), int(4)),
        Statement::Print(Expression::dereference(var("p"))),
        Statement::Print(binary(var("p"), BinaryOperatorKind::NotEquals, Expression::null())),
    ]);

    assert_eq!(output, vec!["0", "4", "true"]);
}

#[test]
fn shadowed_variables_resolve_to_the_innermost_scope() {
    let output = run_main(vec![
        Statement::declare("x", Type::Int64, Some(int(1))),
        Statement::Block(Block::new(vec![
            Statement::declare(
                "x",
                Type::Int64,
                Some(binary(var("x"), BinaryOperatorKind::Add, int(1))),
            ),
            Statement::Print(var("x")),
        ])),
        Statement::Print(var("x")),
    ]);

    assert_eq!(output, vec!["2", "1"]);
}

fn program_with_control_flow() -> rtl::Program {
    let max = ast::Callable::function(
        "max",
        vec![
            Parameter::new("a", Type::Int64),
            Parameter::new("b", Type::Int64),
        ],
        Type::Int64,
        Block::new(vec![
            Statement::if_else(
                binary(var("a"), BinaryOperatorKind::GreaterThan, var("b")),
                Block::new(vec![Statement::Return(Some(var("a")))]),
                Some(Block::new(vec![Statement::Return(Some(var("b")))])),
            ),
        ]),
    );

    let main = main_with(vec![
        Statement::declare("i", Type::Int64, Some(int(0))),
        Statement::declare("a", Type::list_of(Type::Bool, 2), None),
        Statement::while_loop(
            binary(
                binary(var("i"), BinaryOperatorKind::LessThan, int(3)),
                BinaryOperatorKind::LogicalOr,
                Expression::boolean(false),
            ),
            Block::new(vec![
                Statement::Print(Expression::call("max", vec![var("i"), int(1)])),
                Statement::assign(var("i"), binary(var("i"), BinaryOperatorKind::Add, int(1))),
            ]),
        ),
        Statement::Print(Expression::index(var("a"), int(0))),
        Statement::Return(None),
    ]);

    lower(vec![], vec![max, main])
}

#[test]
fn labels_and_pseudos_are_unique_across_callables() {
    let program = program_with_control_flow();

    let labels: Vec<Label> = program
        .callables
        .iter()
        .flat_map(|callable| callable.scheduled().map(|(label, _)| label))
        .collect();
    let unique: HashSet<Label> = labels.iter().copied().collect();
    assert_eq!(labels.len(), unique.len());

    let max = defined_pseudos(callable(&program, "max"));
    let main = defined_pseudos(callable(&program, "main"));
    assert!(max.is_disjoint(&main));
}

fn defined_pseudos(callable: &Callable) -> HashSet<Pseudo> {
    callable
        .scheduled()
        .filter_map(|(_, instruction)| match *instruction {
            Instruction::Move { destination, .. }
            | Instruction::Copy { destination, .. }
            | Instruction::CopyFromMachine { destination, .. }
            | Instruction::LoadAddress { destination, .. }
            | Instruction::Load { destination, .. }
            | Instruction::LoadParameter { destination, .. } => Some(destination),
            Instruction::Call { result, .. } => result,
            _ => None,
        })
        .collect()
}

#[test]
fn enter_has_no_predecessor_and_every_path_returns() {
    let program = program_with_control_flow();

    for callable in &program.callables {
        let returns: Vec<Label> = callable
            .scheduled()
            .filter(|(_, instruction)| matches!(instruction, Instruction::Return))
            .map(|(label, _)| label)
            .collect();
        assert_eq!(returns.len(), 1, "`{}` has one return", callable.name);

        assert!(matches!(
            callable.instruction(callable.enter),
            Some(Instruction::NewFrame { .. })
        ));
        assert!(
            callable
                .scheduled()
                .all(|(_, instruction)| !instruction.successors().contains(&callable.enter))
        );

        // The epilogue hangs off `leave`, so it is checked through the return
        let from_enter = reachable_from(callable, callable.enter);
        assert!(from_enter.contains(&callable.leave));

        for label in from_enter {
            assert!(
                reachable_from(callable, label).contains(&returns[0]),
                "{label} cannot reach the return in `{}`",
                callable.name
            );
        }
    }

    assert_eq!(
        interpreter::run(&program).output,
        vec!["1", "1", "2", "false"]
    );
}

fn reachable_from(callable: &Callable, start: Label) -> HashSet<Label> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);

    while let Some(label) = queue.pop_front() {
        if !seen.insert(label) {
            continue;
        }

        if let Some(instruction) = callable.instruction(label) {
            queue.extend(instruction.successors());
        }
    }

    seen
}
