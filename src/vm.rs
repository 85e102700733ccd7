//! The Monkey virtual machine.
//!
//! A **stack-based interpreter** over [`crate::bytecode`] instruction
//! streams: one flat value stack shared by all call frames, a globals
//! vector, and a stack of
//! [`Frame`]s (one per active call).  Dispatch is fetch-then-advance; jump
//! operands are absolute offsets, so `OpJump`/`OpJumpNotTruthy` simply
//! assign the instruction pointer.
//!
//! # Frame layout
//!
//! A call's arguments become its first locals: `base_pointer` is the stack
//! index of argument 0, and the callee reserves `num_locals` slots starting
//! there before pushing any working values.  Returning truncates the stack
//! to just below the callee value and pushes the result.
//!
//! # Truthiness
//!
//! Only `false` and `null` are non-truthy.  Integer `0` is truthy, the same
//! as every other value.
//!
//! # Error policy
//!
//! No runtime error is recoverable: the first one halts execution.  Array
//! out-of-bounds indexing and hash misses are *not* errors — they produce
//! `null`.  Monkey is permissive on lookup, strict on operations.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::builtins::BUILTINS;
use crate::bytecode::{read_u16, read_u8, Op};
use crate::compiler::Bytecode;
use crate::value::{Closure, CompiledFunction, HashKey, HashPair, Value};

/// Operand stack capacity, in slots.
pub const STACK_SIZE: usize = 2048;
/// Number of global variable slots.
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call depth.
pub const MAX_FRAMES: usize = 1024;

// Shared singletons.  Comparing booleans is a value comparison either way in
// Rust, but keeping single definitions mirrors how the VM treats them: there
// is exactly one true, one false, and one null.
const TRUE: Value = Value::Boolean(true);
const FALSE: Value = Value::Boolean(false);
const NULL: Value = Value::Null;

// ─────────────────────────────────────────────────────────────────────────────
// Runtime error
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime error raised by the VM.  Halts execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError(pub String);

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RuntimeError {}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// One active call: the closure being executed, its instruction pointer, and
/// where its locals begin on the value stack.
struct Frame {
    closure: Rc<Closure>,
    /// Index of the next byte to fetch.
    ip: usize,
    /// Stack index of argument 0 / local 0.
    base_pointer: usize,
}

impl Frame {
    fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vm
// ─────────────────────────────────────────────────────────────────────────────

/// The Monkey virtual machine.
pub struct Vm {
    constants: Vec<Value>,
    /// The value stack.  Slots above `sp` keep their old values, which is
    /// what makes [`Vm::last_popped`] work.
    stack: Vec<Value>,
    /// Next free stack slot; the top of the stack is `sp - 1`.
    sp: usize,
    globals: Vec<Value>,
    /// Active call frames, innermost last.
    frames: Vec<Frame>,
}

impl Vm {
    /// Create a VM with a fresh globals vector.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![NULL; GLOBALS_SIZE])
    }

    /// Create a VM that reuses an existing globals vector (REPL sessions).
    pub fn with_globals(bytecode: Bytecode, mut globals: Vec<Value>) -> Self {
        globals.resize(GLOBALS_SIZE, NULL);

        // The main program runs as a synthetic zero-argument closure.
        let main_fn = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main_closure = Closure {
            func: Rc::new(main_fn),
            free: Vec::new(),
        };
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame {
            closure: Rc::new(main_closure),
            ip: 0,
            base_pointer: 0,
        });

        Vm {
            constants: bytecode.constants,
            stack: vec![NULL; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Recover the globals vector for the next REPL line.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently popped off the stack.
    ///
    /// After a program ends, the stack is empty and the slot just above `sp`
    /// still holds the value the final `OpPop` discarded — the result of the
    /// last expression statement.  The REPL prints this.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Main dispatch loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Execute until the main frame runs off the end of its instructions.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let ip = self.current_frame().ip;
            let byte = self.current_frame().instructions()[ip];
            self.current_frame_mut().ip += 1;
            let op = Op::try_from(byte)
                .map_err(|b| RuntimeError(format!("opcode {b} undefined")))?;
            trace!(?op, ip, "dispatch");

            match op {
                Op::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self.constants.get(index).cloned().ok_or_else(|| {
                        RuntimeError(format!("constant index {index} out of range"))
                    })?;
                    self.push(constant)?;
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    self.execute_binary_operation(op)?;
                }

                Op::Pop => {
                    self.pop()?;
                }

                Op::True => self.push(TRUE)?,
                Op::False => self.push(FALSE)?,
                Op::Null => self.push(NULL)?,

                Op::Equal | Op::NotEqual | Op::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                Op::Bang => {
                    let operand = self.pop()?;
                    self.push(Value::Boolean(!is_truthy(&operand)))?;
                }
                Op::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Integer(n) => self.push(Value::Integer(n.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError(format!(
                                "unsupported type for negation: {}",
                                other.type_name()
                            )))
                        }
                    }
                }

                Op::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop()?;
                    if !is_truthy(&condition) {
                        self.current_frame_mut().ip = target;
                    }
                }
                Op::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }

                Op::SetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.pop()?;
                    self.globals[index] = value;
                }
                Op::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }

                Op::SetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base + index] = value;
                }
                Op::GetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + index].clone();
                    self.push(value)?;
                }

                Op::Array => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::array(elements))?;
                }
                Op::Hash => {
                    let count = self.read_u16_operand();
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Op::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }

                Op::Call => {
                    let num_args = self.read_u8_operand();
                    self.execute_call(num_args)?;
                }
                Op::ReturnValue => {
                    let return_value = self.pop()?;
                    if self.return_from_frame(return_value)? {
                        return Ok(());
                    }
                }
                Op::Return => {
                    if self.return_from_frame(NULL)? {
                        return Ok(());
                    }
                }

                Op::GetBuiltin => {
                    let index = self.read_u8_operand();
                    self.push(Value::Builtin(index))?;
                }

                Op::Closure => {
                    let const_index = self.read_u16_operand();
                    let num_free = self.read_u8_operand();
                    self.push_closure(const_index, num_free)?;
                }
                Op::GetFree => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }
                Op::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frames and operand fetch
    // ─────────────────────────────────────────────────────────────────────────

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let operand = read_u16(&frame.closure.func.instructions.0[frame.ip..]) as usize;
        frame.ip += 2;
        operand
    }

    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let operand = read_u8(&frame.closure.func.instructions.0[frame.ip..]) as usize;
        frame.ip += 1;
        operand
    }

    /// Pop the current frame, discard the callee and its locals, and push
    /// `value` as the call's result.  Returns `true` when the popped frame
    /// was the main frame (a top-level `return` ends the program).
    fn return_from_frame(&mut self, value: Value) -> Result<bool, RuntimeError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError("frame stack underflow".to_string()))?;
        if self.frames.is_empty() {
            self.sp = frame.base_pointer;
            self.push(value)?;
            return Ok(true);
        }
        // base_pointer - 1 is the callee slot; truncating past it discards
        // the callee, the arguments, and all locals at once.
        self.sp = frame.base_pointer - 1;
        self.push(value)?;
        Ok(false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stack helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError("stack overflow".to_string()));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError("stack underflow".to_string()));
        }
        self.sp -= 1;
        // The slot keeps its value; see last_popped().
        Ok(self.stack[self.sp].clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operators
    // ─────────────────────────────────────────────────────────────────────────

    fn execute_binary_operation(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    Op::Add => l.wrapping_add(*r),
                    Op::Sub => l.wrapping_sub(*r),
                    Op::Mul => l.wrapping_mul(*r),
                    Op::Div => {
                        if *r == 0 {
                            return Err(RuntimeError("integer division by zero".to_string()));
                        }
                        l.wrapping_div(*r)
                    }
                    _ => unreachable!("non-arithmetic opcode {op:?}"),
                };
                self.push(Value::Integer(result))
            }
            (Value::Str(l), Value::Str(r)) => {
                if op != Op::Add {
                    return Err(RuntimeError(format!(
                        "unknown string operator: {}",
                        op.definition().name
                    )));
                }
                self.push(Value::string(format!("{l}{r}")))
            }
            _ => Err(RuntimeError(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            let result = match op {
                Op::Equal => l == r,
                Op::NotEqual => l != r,
                Op::GreaterThan => l > r,
                _ => unreachable!("non-comparison opcode {op:?}"),
            };
            return self.push(Value::Boolean(result));
        }
        match op {
            // Booleans, strings, and null compare by value; aggregates and
            // functions by identity.  Mixed types are simply unequal.
            Op::Equal => {
                let equal = left == right;
                self.push(Value::Boolean(equal))
            }
            Op::NotEqual => {
                let equal = left == right;
                self.push(Value::Boolean(!equal))
            }
            _ => Err(RuntimeError(format!(
                "unknown operator: {} ({} {})",
                op.definition().name,
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, RuntimeError> {
        let mut pairs: HashMap<HashKey, HashPair> = HashMap::with_capacity((end - start) / 2);
        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let hash_key = key.hash_key().ok_or_else(|| {
                RuntimeError(format!("unusable as hash key: {}", key.type_name()))
            })?;
            pairs.insert(hash_key, HashPair { key, value });
            i += 2;
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(
        &mut self,
        left: Value,
        index: Value,
    ) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                // Out-of-bounds is a miss, not an error.
                if *i < 0 || *i >= elements.len() as i64 {
                    self.push(NULL)
                } else {
                    self.push(elements[*i as usize].clone())
                }
            }
            (Value::Hash(pairs), _) => {
                let key = index.hash_key().ok_or_else(|| {
                    RuntimeError(format!("unusable as hash key: {}", index.type_name()))
                })?;
                match pairs.get(&key) {
                    Some(pair) => self.push(pair.value.clone()),
                    None => self.push(NULL),
                }
            }
            _ => Err(RuntimeError(format!(
                "index operator not supported: {}",
                left.type_name()
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls and closures
    // ─────────────────────────────────────────────────────────────────────────

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(index) => self.call_builtin(index, num_args),
            _ => Err(RuntimeError("calling non-function".to_string())),
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        num_args: usize,
    ) -> Result<(), RuntimeError> {
        if num_args != closure.func.num_parameters {
            return Err(RuntimeError(format!(
                "wrong number of arguments: want={}, got={num_args}",
                closure.func.num_parameters
            )));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError("stack overflow".to_string()));
        }
        trace!(depth = self.frames.len(), num_args, "calling closure");
        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;
        self.frames.push(Frame {
            closure,
            ip: 0,
            base_pointer,
        });
        // Arguments already occupy the first slots; reserve the rest.
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, index: usize, num_args: usize) -> Result<(), RuntimeError> {
        let builtin = BUILTINS
            .get(index)
            .ok_or_else(|| RuntimeError(format!("builtin index {index} out of range")))?;
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args).map_err(RuntimeError)?;
        // Discard the arguments and the callee, then push the result.
        self.sp = self.sp - num_args - 1;
        self.push(result)
    }

    fn push_closure(
        &mut self,
        const_index: usize,
        num_free: usize,
    ) -> Result<(), RuntimeError> {
        let constant = self.constants.get(const_index).cloned().ok_or_else(|| {
            RuntimeError(format!("constant index {const_index} out of range"))
        })?;
        let Value::Function(func) = constant else {
            return Err(RuntimeError(format!("not a function: {constant:?}")));
        };
        // The free variables sit on top of the stack in capture order.
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;
        self.push(Value::Closure(Rc::new(Closure { func, free })))
    }
}

/// Only `false` and `null` are non-truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Boolean(b) => *b,
        Value::Null => false,
        _ => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser;

    fn run_vm(input: &str) -> (Vm, Result<(), RuntimeError>) {
        let program = parser::parse(input).unwrap();
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        let mut vm = Vm::new(compiler.bytecode());
        let result = vm.run();
        (vm, result)
    }

    fn run(input: &str) -> Value {
        let (vm, result) = run_vm(input);
        result.unwrap_or_else(|e| panic!("vm error for {input:?}: {e}"));
        vm.last_popped().clone()
    }

    fn expect(input: &str, want: Value) {
        assert_eq!(run(input), want, "input: {input}");
    }

    fn expect_int(input: &str, want: i64) {
        expect(input, Value::Integer(want));
    }

    fn expect_error(input: &str, message: &str) {
        let (_, result) = run_vm(input);
        assert_eq!(
            result.unwrap_err(),
            RuntimeError(message.to_string()),
            "input: {input}"
        );
    }

    #[test]
    fn test_integer_arithmetic() {
        expect_int("1", 1);
        expect_int("1 + 2", 3);
        expect_int("1 - 2", -1);
        expect_int("4 / 2", 2);
        expect_int("50 / 2 * 2 + 10 - 5", 55);
        expect_int("5 * (2 + 10)", 60);
        expect_int("-5", -5);
        expect_int("-50 + 100 + -50", 0);
        expect_int("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50);
    }

    #[test]
    fn test_boolean_expressions() {
        expect("true", TRUE);
        expect("false", FALSE);
        expect("1 < 2", TRUE);
        expect("1 > 2", FALSE);
        expect("1 == 1", TRUE);
        expect("1 != 1", FALSE);
        expect("true == true", TRUE);
        expect("true != false", TRUE);
        expect("(1 < 2) == true", TRUE);
        expect("(1 > 2) == true", FALSE);
        expect("!true", FALSE);
        expect("!!5", TRUE);
        expect("\"a\" == \"a\"", TRUE);
        expect("\"a\" == \"b\"", FALSE);
        expect("1 == true", FALSE);
    }

    #[test]
    fn test_conditionals() {
        expect_int("if (true) { 10 }", 10);
        expect_int("if (true) { 10 } else { 20 }", 10);
        expect_int("if (false) { 10 } else { 20 }", 20);
        expect_int("if (1) { 10 }", 10);
        expect_int("if (1 < 2) { 10 } else { 20 }", 10);
        expect("if (false) { 10 }", NULL);
        expect("if (1 > 2) { 10 }", NULL);
        // An if-expression is a value like any other.
        expect_int("if (if (false) { 10 }) { 10 } else { 20 }", 20);
        expect("!(if (false) { 5; })", TRUE);
        // Integer zero is truthy; only false and null are not.
        expect_int("if (0) { 10 } else { 20 }", 10);
    }

    #[test]
    fn test_global_let_statements() {
        expect_int("let one = 1; one", 1);
        expect_int("let one = 1; let two = 2; one + two", 3);
        expect_int("let one = 1; let two = one + one; one + two", 3);
    }

    #[test]
    fn test_string_expressions() {
        expect("\"monkey\"", Value::string("monkey"));
        expect("\"mon\" + \"key\"", Value::string("monkey"));
        expect("\"mon\" + \"key\" + \"banana\"", Value::string("monkeybanana"));
    }

    #[test]
    fn test_array_literals() {
        expect("[]", Value::array(vec![]));
        expect(
            "[1, 2, 3]",
            Value::array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ]),
        );
        // Elements evaluate left to right.
        expect(
            "[1 + 2, 3 * 4, 5 + 6]",
            Value::array(vec![
                Value::Integer(3),
                Value::Integer(12),
                Value::Integer(11),
            ]),
        );
    }

    #[test]
    fn test_hash_literals() {
        expect_int("{1: 1, 2: 2}[1]", 1);
        expect_int("{1: 1, 2: 2}[2]", 2);
        expect_int("{\"one\": 1, \"two\": 2}[\"two\"]", 2);
        expect_int("{true: 5}[true]", 5);
        expect("{1: 1}[0]", NULL);
        expect("{}[0]", NULL);
    }

    #[test]
    fn test_index_expressions() {
        expect_int("[1, 2, 3][1]", 2);
        expect_int("[[1, 1, 1]][0][0]", 1);
        expect("[][0]", NULL);
        expect("[1, 2, 3][99]", NULL);
        expect("[1][-1]", NULL);
    }

    #[test]
    fn test_calling_functions() {
        expect_int("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", 15);
        expect_int(
            "let one = fn() { 1; }; let two = fn() { 2; }; one() + two()",
            3,
        );
        expect_int(
            "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
            3,
        );
        expect_int("let earlyExit = fn() { return 99; 100; }; earlyExit();", 99);
        expect("let noReturn = fn() { }; noReturn();", NULL);
        expect_int("let identity = fn(a) { a; }; identity(4);", 4);
        expect_int("let sum = fn(a, b) { a + b; }; sum(1, 2);", 3);
        expect_int(
            "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
            10,
        );
        // First-class: a function returning a function.
        expect_int(
            "let returnsOne = fn() { 1; }; let returnsOneReturner = fn() { returnsOne; }; returnsOneReturner()();",
            1,
        );
    }

    #[test]
    fn test_local_bindings() {
        expect_int("let one = fn() { let one = 1; one }; one();", 1);
        expect_int(
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
            3,
        );
        expect_int(
            "let firstFoobar = fn() { let foobar = 50; foobar; };
             let secondFoobar = fn() { let foobar = 100; foobar; };
             firstFoobar() + secondFoobar();",
            150,
        );
        expect_int(
            "let globalSeed = 50;
             let minusOne = fn() { let num = 1; globalSeed - num; };
             let minusTwo = fn() { let num = 2; globalSeed - num; };
             minusOne() + minusTwo();",
            97,
        );
    }

    #[test]
    fn test_wrong_argument_counts() {
        expect_error("fn() { 1; }(1);", "wrong number of arguments: want=0, got=1");
        expect_error("fn(a) { a; }();", "wrong number of arguments: want=1, got=0");
        expect_error(
            "fn(a, b) { a + b; }(1);",
            "wrong number of arguments: want=2, got=1",
        );
    }

    #[test]
    fn test_builtin_functions() {
        expect_int("len(\"\")", 0);
        expect_int("len(\"four\")", 4);
        expect_int("len([1, 2, 3])", 3);
        expect_int("first([1, 2, 3])", 1);
        expect_int("last([1, 2, 3])", 3);
        expect("first([])", NULL);
        expect("last([])", NULL);
        expect("rest([])", NULL);
        expect(
            "rest([1, 2, 3])",
            Value::array(vec![Value::Integer(2), Value::Integer(3)]),
        );
        expect("push([], 1)", Value::array(vec![Value::Integer(1)]));
        expect("puts(\"hello\")", NULL);
        expect_error("len(1)", "argument to `len` not supported, got INTEGER");
        expect_error(
            "len(\"one\", \"two\")",
            "wrong number of arguments. got=2, want=1",
        );
        expect_error("first(1)", "argument to `first` must be ARRAY, got INTEGER");
        expect_error("push(1, 1)", "argument to `push` must be ARRAY, got INTEGER");
    }

    #[test]
    fn test_closures() {
        expect_int(
            "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
            99,
        );
        expect_int(
            "let newAdder = fn(a) { fn(b) { a + b; }; }; let addTwo = newAdder(2); addTwo(3);",
            5,
        );
        expect_int(
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; }; let adder = newAdder(1, 2); adder(8);",
            11,
        );
        expect_int(
            "let newAdderOuter = fn(a) { fn(b) { fn(c) { a + b + c } } };
             newAdderOuter(1)(2)(3);",
            6,
        );
        // Capture threads through every intermediate closure.
        expect_int(
            "let a = 1;
             let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d } } };
             let newAdderInner = newAdderOuter(2);
             let adder = newAdderInner(3);
             adder(8);",
            14,
        );
        expect_int(
            "let newClosure = fn(a, b) {
               let one = fn() { a; };
               let two = fn() { b; };
               fn() { one() + two(); };
             };
             let closure = newClosure(9, 90);
             closure();",
            99,
        );
    }

    #[test]
    fn test_recursive_functions() {
        expect_int(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             countDown(1);",
            0,
        );
        expect_int(
            "let wrapper = fn() {
               let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
               countDown(1);
             };
             wrapper();",
            0,
        );
    }

    #[test]
    fn test_fibonacci() {
        expect_int(
            "let fibonacci = fn(x) {
               if (x < 2) { return x; } else { return fibonacci(x - 1) + fibonacci(x - 2); }
             };
             fibonacci(15);",
            610,
        );
    }

    #[test]
    fn test_map_via_builtins() {
        expect(
            "let map = fn(arr, f) {
               let iter = fn(arr, accumulated) {
                 if (len(arr) == 0) {
                   accumulated
                 } else {
                   iter(rest(arr), push(accumulated, f(first(arr))));
                 }
               };
               iter(arr, []);
             };
             map([1, 2, 3, 4], fn(x) { x * 2 });",
            Value::array(vec![
                Value::Integer(2),
                Value::Integer(4),
                Value::Integer(6),
                Value::Integer(8),
            ]),
        );
    }

    #[test]
    fn test_counter_recursion() {
        expect(
            "let counter = fn(x) {
               if (x > 100) { return true; } else { let foobar = 9999; counter(x + 1); }
             };
             counter(0);",
            TRUE,
        );
    }

    #[test]
    fn test_runtime_errors() {
        expect_error("5 + true", "unsupported types for binary operation: INTEGER BOOLEAN");
        expect_error("5 + true; 5;", "unsupported types for binary operation: INTEGER BOOLEAN");
        expect_error("-true", "unsupported type for negation: BOOLEAN");
        expect_error("true + false", "unsupported types for binary operation: BOOLEAN BOOLEAN");
        expect_error("\"a\" - \"b\"", "unknown string operator: OpSub");
        expect_error("true > false", "unknown operator: OpGreaterThan (BOOLEAN BOOLEAN)");
        expect_error("5 / 0", "integer division by zero");
        expect_error("1(2)", "calling non-function");
        expect_error("{\"name\": \"Monkey\"}[fn(x) { x }];", "unusable as hash key: CLOSURE");
        expect_error("{[1]: 2}", "unusable as hash key: ARRAY");
        expect_error("[1](0)", "calling non-function");
        expect_error("5[0]", "index operator not supported: INTEGER");
        expect_error(
            "{\"one\": 1, \"two\": 2}[\"one\"] + {\"three\": 3}[\"four\"]",
            "unsupported types for binary operation: INTEGER NULL",
        );
    }

    #[test]
    fn test_function_with_max_parameters() {
        // 255 is the most OpCall's one-byte operand can express.
        let params: Vec<String> = (0..255).map(|i| format!("p{i}")).collect();
        let args: Vec<String> = (0..255).map(|i| i.to_string()).collect();
        let source = format!(
            "let f = fn({}) {{ p254 }}; f({});",
            params.join(", "),
            args.join(", ")
        );
        expect_int(&source, 254);
    }

    #[test]
    fn test_stack_overflow_on_unbounded_recursion() {
        expect_error("let f = fn() { f(); }; f();", "stack overflow");
    }

    #[test]
    fn test_stack_discipline() {
        let (vm, result) = run_vm("1; 2; 3;");
        result.unwrap();
        assert_eq!(vm.sp, 0, "stack must be empty after a full program");
        assert_eq!(vm.last_popped(), &Value::Integer(3));
    }

    #[test]
    fn test_empty_program() {
        let (vm, result) = run_vm("");
        result.unwrap();
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped(), &NULL);
    }

    #[test]
    fn test_globals_survive_across_runs() {
        // The REPL wiring: constants, symbols, and globals carry over.
        let program = parser::parse("let x = 5;").unwrap();
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        let bytecode = compiler.bytecode();
        let (symbols, constants) = compiler.into_state();
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        let globals = vm.into_globals();

        let program = parser::parse("x + 1").unwrap();
        let mut compiler = Compiler::with_state(symbols, constants);
        compiler.compile(&program).unwrap();
        let mut vm = Vm::with_globals(compiler.bytecode(), globals);
        vm.run().unwrap();
        assert_eq!(vm.last_popped(), &Value::Integer(6));
    }
}
