//! End-to-end scenarios exercising frontend -> emitter -> image -> VM (§8).

use tvm::emitter::Emitter;
use tvm::section::{Image, Section};
use tvm::value::Value;
use tvm::vm::Vm;

fn compile_and_build_image(source: &str) -> Vec<u8> {
    let tree = frontend::parse(source).expect("source parses");
    let emitted = Emitter::new().emit(&tree).expect("emits cleanly");

    let mut image = Image::new();
    image.add_section(&Section::new_code(emitted.code).unwrap(), true).unwrap();
    if !emitted.vars.is_empty() {
        image.add_section(&Section::new_variables(emitted.vars).unwrap(), true).unwrap();
    }
    if !emitted.consts.is_empty() {
        image.add_section(&Section::new_consts(emitted.consts).unwrap(), false).unwrap();
    }
    image.into_bytes()
}

fn run_to_completion(image_bytes: &[u8]) -> Vm {
    let mut vm = Vm::new(image_bytes).expect("image loads");
    vm.run().expect("program runs without fault");
    vm
}

fn var_value<'a>(vm: &'a Vm, name: &str) -> &'a Value {
    &vm.symbols().find(|s| s.name == name).unwrap_or_else(|| panic!("no symbol named {:?}", name)).value
}

#[test]
fn e1_arithmetic() {
    let image = compile_and_build_image("x = 2; y = 3; x * y;");
    let vm = run_to_completion(&image);

    assert_eq!(var_value(&vm, "x"), &Value::Integer(2));
    assert_eq!(var_value(&vm, "y"), &Value::Integer(3));

    let top = *vm.cmd_stack().last().expect("product left on the command stack");
    assert_eq!(vm.symbols().find(|s| s.id == top).unwrap().value, Value::Integer(6));
}

#[test]
fn e3_while_counter() {
    let image = compile_and_build_image("i = 0; while (i < 5) { i = i + 1; }");
    let vm = run_to_completion(&image);
    assert_eq!(var_value(&vm, "i"), &Value::Integer(5));
}

#[test]
fn e3_while_counter_negated() {
    let image = compile_and_build_image("i = 0; while (i < 5) { i = i + 1; } i = -(i);");
    let vm = run_to_completion(&image);
    assert_eq!(var_value(&vm, "i"), &Value::Integer(-5));
}

#[test]
fn e4_if_else_true_branch_does_not_abort() {
    let image = compile_and_build_image("if (3 > 2) { x = 1; } else { abort_marker = 1; }");
    let vm = run_to_completion(&image);
    assert!(vm.symbols().any(|s| s.name == "x"));
    assert!(vm.symbols().find(|s| s.name == "abort_marker").is_none());
}

#[test]
fn e4_if_else_false_branch_does_not_abort() {
    let image = compile_and_build_image("if (2 > 3) { then_marker = 1; } else { x = 1; }");
    let vm = run_to_completion(&image);
    assert!(vm.symbols().any(|s| s.name == "x"));
    assert!(vm.symbols().find(|s| s.name == "then_marker").is_none());
}

#[test]
fn e8_image_round_trip_preserves_code_and_symbols() {
    let image_bytes = compile_and_build_image("a = 7; b = 8; a + b;");

    let sections = tvm::section::sections_from_image(&image_bytes).unwrap();
    assert_eq!(sections.len(), 3); // code + variables (a, b) + consts (7, 8)

    let reloaded = tvm::section::sections_from_image(&image_bytes).unwrap();
    for (a, b) in sections.iter().zip(reloaded.iter()) {
        assert_eq!(a.id, b.id);
    }
}

#[test]
fn division_by_zero_faults_rather_than_panicking() {
    let image = compile_and_build_image("x = 1; y = 0; x / y;");
    let mut vm = Vm::new(&image).unwrap();
    let err = vm.run().expect_err("division by zero must fault, not panic");
    assert!(format!("{}", err).contains("divide"));
}
