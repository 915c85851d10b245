use std::io::{self, Write};

use compiler::chunk::value::{Object, StringTable, Value};
use compiler::chunk::{Chunk, OpCode};
use compiler::error::{CompileError, RuntimeError};
use compiler::table::{GlobalEntry, Globals};

const STACK_MAX: usize = 256;

/// Either half of what can go wrong running a script: the compiler's
/// collected errors, or a single runtime error from the fetch-decode-execute
/// loop. Kept distinct rather than unified into one enum because a driver
/// maps the two to different process exit codes.
#[derive(Debug)]
pub enum InterpretError {
    Compile(Vec<CompileError>),
    Runtime(RuntimeError),
}

impl std::fmt::Display for InterpretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpretError::Compile(errors) => {
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            InterpretError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

/// The fetch-decode-execute machine. Owns the evaluation stack, the globals
/// table, and the string intern table, all of which live for as long as the
/// `Vm` does — so a REPL can hand the same `Vm` a new `Chunk` per line and
/// have variables and interned strings persist across lines.
///
/// Generic over where `print`/`input` write their output so tests can
/// capture it; `Vm::new()` wires up real stdout.
pub struct Vm<W: Write = io::Stdout> {
    stack: Vec<Value>,
    globals: Globals,
    strings: StringTable,
    out: W,
}

impl Vm<io::Stdout> {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for Vm<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            globals: Globals::new(),
            strings: StringTable::new(),
            out,
        }
    }

    /// Compiles `source` against this VM's intern table and runs the
    /// resulting chunk. On a runtime error the stack is reset, matching the
    /// reference implementation's `resetStack()` on the error path (a
    /// successful run is expected to already have emptied it).
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let chunk = compiler::compile(source, &mut self.strings).map_err(InterpretError::Compile)?;
        match self.run(&chunk) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stack.clear();
                Err(InterpretError::Runtime(e))
            }
        }
    }

    fn push(&mut self, value: Value, chunk: &Chunk, op_start: usize) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow(chunk.line(op_start)));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack
            .pop()
            .expect("compiler never emits an opcode that underflows the stack")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn pop_number(&mut self, chunk: &Chunk, op_start: usize) -> Result<f64, RuntimeError> {
        match self.pop() {
            Value::Number(n) => Ok(n),
            _ => Err(RuntimeError::NotANumber(chunk.line(op_start))),
        }
    }

    fn run(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        let mut ip: usize = 0;
        loop {
            let op_start = ip;
            let op = OpCode::from_u8(chunk.code()[ip])
                .expect("the compiler never emits an unrecognized opcode byte");
            ip += 1;

            match op {
                OpCode::Constant => {
                    let idx = chunk.read_short(ip);
                    ip += 2;
                    let value = chunk.constant(idx).clone();
                    self.push(value, chunk, op_start)?;
                }
                OpCode::Nil | OpCode::Nv => self.push(Value::Nil, chunk, op_start)?,
                OpCode::True => self.push(Value::Bool(true), chunk, op_start)?,
                OpCode::False => self.push(Value::Bool(false), chunk, op_start)?,
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetGlobal => {
                    let idx = chunk.read_short(ip);
                    ip += 2;
                    let name = chunk
                        .constant(idx)
                        .as_str_object()
                        .expect("global name constants are always strings")
                        .clone();
                    match self.globals.get(&name) {
                        Some(entry) => {
                            let value = entry.value.clone();
                            self.push(value, chunk, op_start)?;
                        }
                        None => {
                            return Err(RuntimeError::UndefinedGlobal(
                                name.bytes.clone(),
                                chunk.line(op_start),
                            ))
                        }
                    }
                }
                OpCode::DefineGlobal | OpCode::DefineGlobalConst => {
                    let idx = chunk.read_short(ip);
                    ip += 2;
                    let name = chunk
                        .constant(idx)
                        .as_str_object()
                        .expect("global name constants are always strings")
                        .clone();
                    let value = self.pop();
                    self.globals.set(
                        name,
                        GlobalEntry {
                            value,
                            is_const: op == OpCode::DefineGlobalConst,
                        },
                    );
                }
                OpCode::SetGlobal => {
                    let idx = chunk.read_short(ip);
                    ip += 2;
                    let name = chunk
                        .constant(idx)
                        .as_str_object()
                        .expect("global name constants are always strings")
                        .clone();
                    let value = self.peek(0).clone();
                    match self.globals.get_mut(&name) {
                        Some(entry) if entry.is_const => {
                            return Err(RuntimeError::AssignConstGlobal(
                                name.bytes.clone(),
                                chunk.line(op_start),
                            ))
                        }
                        Some(entry) => entry.value = value,
                        None => {
                            return Err(RuntimeError::AssignUndefinedGlobal(
                                name.bytes.clone(),
                                chunk.line(op_start),
                            ))
                        }
                    }
                }
                OpCode::GetLocal => {
                    let slot = chunk.read_short(ip) as usize;
                    ip += 2;
                    let value = self.stack[slot].clone();
                    self.push(value, chunk, op_start)?;
                }
                OpCode::SetLocal => {
                    let slot = chunk.read_short(ip) as usize;
                    ip += 2;
                    self.stack[slot] = self.peek(0).clone();
                }
                OpCode::Not => {
                    let falsey = self.pop().is_falsey();
                    self.push(Value::Bool(falsey), chunk, op_start)?;
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b), chunk, op_start)?;
                }
                OpCode::Less | OpCode::Greater | OpCode::LessEqual | OpCode::GreaterEqual => {
                    let b = self.pop_number(chunk, op_start)?;
                    let a = self.pop_number(chunk, op_start)?;
                    let result = match op {
                        OpCode::Less => a < b,
                        OpCode::Greater => a > b,
                        OpCode::LessEqual => a <= b,
                        OpCode::GreaterEqual => a >= b,
                        _ => unreachable!(),
                    };
                    self.push(Value::Bool(result), chunk, op_start)?;
                }
                OpCode::Add => {
                    let b = self.pop();
                    let a = self.pop();
                    match (&a, &b) {
                        (Value::Number(x), Value::Number(y)) => {
                            self.push(Value::Number(x + y), chunk, op_start)?
                        }
                        (Value::Object(Object::Str(_)), Value::Object(Object::Str(_))) => {
                            let sa = a.as_str_object().unwrap();
                            let sb = b.as_str_object().unwrap();
                            let mut combined =
                                String::with_capacity(sa.bytes.len() + sb.bytes.len());
                            combined.push_str(&sa.bytes);
                            combined.push_str(&sb.bytes);
                            let interned = self.strings.take_string(combined);
                            self.push(Value::from(interned), chunk, op_start)?
                        }
                        _ => return Err(RuntimeError::AddTypeMismatch(chunk.line(op_start))),
                    }
                }
                OpCode::Subtract | OpCode::Multiply | OpCode::Divide | OpCode::Pow => {
                    let b = self.pop_number(chunk, op_start)?;
                    let a = self.pop_number(chunk, op_start)?;
                    let result = match op {
                        OpCode::Subtract => a - b,
                        OpCode::Multiply => a * b,
                        OpCode::Divide => a / b,
                        OpCode::Pow => a.powf(b),
                        _ => unreachable!(),
                    };
                    self.push(Value::Number(result), chunk, op_start)?;
                }
                OpCode::Negate => {
                    let a = self.pop_number(chunk, op_start)?;
                    self.push(Value::Number(-a), chunk, op_start)?;
                }
                OpCode::Print => {
                    let value = self.pop();
                    writeln!(self.out, "{value}").expect("write to output failed");
                }
                OpCode::Input => {
                    let mut line = String::new();
                    io::stdin()
                        .read_line(&mut line)
                        .expect("failed to read from stdin");
                    if line.ends_with('\n') {
                        line.pop();
                        if line.ends_with('\r') {
                            line.pop();
                        }
                    }
                    let interned = self.strings.take_string(line);
                    self.push(Value::from(interned), chunk, op_start)?;
                }
                OpCode::JumpIfFalse => {
                    let offset = chunk.read_short(ip) as usize;
                    ip += 2;
                    if self.peek(0).is_falsey() {
                        ip += offset;
                    }
                }
                OpCode::Jump => {
                    let offset = chunk.read_short(ip) as usize;
                    ip += 2;
                    ip += offset;
                }
                OpCode::Loop => {
                    let offset = chunk.read_short(ip) as usize;
                    ip += 2;
                    ip -= offset;
                }
                OpCode::Return => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<String, InterpretError> {
        let mut buf = Vec::new();
        let mut vm = Vm::with_writer(&mut buf);
        vm.interpret(src)?;
        Ok(String::from_utf8(buf).unwrap())
    }

    #[test]
    fn prints_arithmetic_result() {
        assert_eq!(run("print(1 + 2 * 3);").unwrap(), "7\n");
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run(r#"print("foo" + "bar");"#).unwrap(), "foobar\n");
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        let err = run(r#"print(1 + "a");"#).unwrap_err();
        match err {
            InterpretError::Runtime(RuntimeError::AddTypeMismatch(_)) => {}
            other => panic!("expected AddTypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn while_loop_prints_each_iteration() {
        let out = run(
            "var i = 0; while (i < 3) { print(i); i = i + 1; }",
        )
        .unwrap();
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn or_short_circuits_on_truthy_left() {
        assert_eq!(run("print(7 or 3);").unwrap(), "7\n");
    }

    #[test]
    fn and_short_circuits_on_falsey_left() {
        assert_eq!(run("print(nil and 3);").unwrap(), "nil\n");
    }

    #[test]
    fn globals_persist_across_separate_interpret_calls() {
        let mut buf = Vec::new();
        let mut vm = Vm::with_writer(&mut buf);
        vm.interpret("var x = 1;").unwrap();
        vm.interpret("print(x);").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1\n");
    }

    #[test]
    fn reassigning_a_const_global_in_the_same_pass_is_a_compile_error() {
        // spec.md §8 scenario 3.
        let err = run("const k = 1; k = 2;").unwrap_err();
        assert!(matches!(err, InterpretError::Compile(_)));
    }

    #[test]
    fn reassigning_a_const_global_declared_in_an_earlier_pass_is_a_runtime_error() {
        // Each `interpret()` call compiles against a fresh `Compiler`, so a
        // `const` declared on an earlier REPL line is only caught by the
        // VM's `SetGlobal` handler, not by the compiler's same-pass check.
        let mut buf = Vec::new();
        let mut vm = Vm::with_writer(&mut buf);
        vm.interpret("const k = 1;").unwrap();
        let err = vm.interpret("k = 2;").unwrap_err();
        match err {
            InterpretError::Runtime(RuntimeError::AssignConstGlobal(name, _)) => {
                assert_eq!(name, "k")
            }
            other => panic!("expected AssignConstGlobal, got {other:?}"),
        }
    }

    #[test]
    fn assigning_an_undefined_global_is_a_runtime_error() {
        let err = run("x = 1;").unwrap_err();
        assert!(matches!(
            err,
            InterpretError::Runtime(RuntimeError::AssignUndefinedGlobal(..))
        ));
    }

    #[test]
    fn reading_an_undefined_global_is_a_runtime_error() {
        let err = run("print(x);").unwrap_err();
        assert!(matches!(
            err,
            InterpretError::Runtime(RuntimeError::UndefinedGlobal(..))
        ));
    }

    #[test]
    fn if_else_runs_the_matching_branch_only() {
        assert_eq!(run("if (true) { print(1); } else { print(2); }").unwrap(), "1\n");
        assert_eq!(run("if (false) { print(1); } else { print(2); }").unwrap(), "2\n");
    }

    #[test]
    fn local_shadows_global_of_the_same_name() {
        let out = run("var x = 1; { var x = 2; print(x); } print(x);").unwrap();
        assert_eq!(out, "2\n1\n");
    }

    #[test]
    fn not_equal_compiles_and_runs_correctly() {
        assert_eq!(run("print(1 != 2);").unwrap(), "true\n");
        assert_eq!(run("print(1 != 1);").unwrap(), "false\n");
    }

    #[test]
    fn division_by_zero_produces_infinity_not_a_runtime_error() {
        assert_eq!(run("print(1 / 0);").unwrap(), "inf\n");
    }

    #[test]
    fn pushing_past_stack_capacity_is_a_runtime_error() {
        // Every local lives in its own stack slot for the rest of its
        // scope, so one more declaration than STACK_MAX overflows the
        // fixed-size evaluation stack with no pops in between.
        let mut src = String::from("{\n");
        for i in 0..=STACK_MAX {
            src.push_str(&format!("var v{i} = {i};\n"));
        }
        src.push_str("}\n");
        let err = run(&src).unwrap_err();
        assert!(matches!(
            err,
            InterpretError::Runtime(RuntimeError::StackOverflow(_))
        ));
    }

    #[test]
    fn compile_errors_surface_as_interpret_error_compile() {
        let err = run("var = 1;").unwrap_err();
        assert!(matches!(err, InterpretError::Compile(_)));
    }
}
