//! AST-to-bytecode compiler for the Monkey language.
//!
//! The compiler performs a single-pass walk of the [`Program`] AST, emitting
//! instructions into the innermost of a stack of compilation scopes — one
//! scope per function literal being compiled, with the main program at the
//! bottom.  Leaving a scope yields the finished function body.
//!
//! # Jump patching
//!
//! Forward jumps are emitted with the placeholder operand `9999` and patched
//! in place once the target offset is known.  Operand widths are fixed per
//! opcode, so rewriting never shifts surrounding bytes.
//!
//! # REPL state
//!
//! [`Compiler::with_state`] / [`Compiler::into_state`] thread one symbol
//! table and constant pool through successive compiles, which is how the
//! REPL accumulates definitions across lines.

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{Block, Expr, InfixOp, PrefixOp, Program, Stmt};
use crate::builtins::BUILTINS;
use crate::bytecode::{make, Instructions, Op};
use crate::symbols::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// A compile-time error.  Compilation aborts on the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError(pub String);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CompileError {}

// ─────────────────────────────────────────────────────────────────────────────
// Compilation scopes
// ─────────────────────────────────────────────────────────────────────────────

/// The opcode and start offset of an instruction that was just emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// The instruction buffer of one function body under compilation, plus
/// enough history to strip or rewrite the most recent instruction.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bytecode
// ─────────────────────────────────────────────────────────────────────────────

/// The compiler's output: the main instruction stream and the constant pool
/// it indexes into.  This is everything the VM needs to run.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiler
// ─────────────────────────────────────────────────────────────────────────────

/// The Monkey bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbols: SymbolTable,
    /// Stack of function bodies being compiled; innermost last.
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Create a compiler with a fresh symbol table and constant pool.  The
    /// builtin registry is pre-defined in the global scope.
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (i, builtin) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(i, builtin.name);
        }
        Self::with_state(symbols, Vec::new())
    }

    /// Create a compiler that continues from existing session state.
    pub fn with_state(symbols: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Recover the session state for the next compile.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbols, self.constants)
    }

    /// Compile a whole program into the current scope.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        trace!(statements = program.statements.len(), "compiling program");
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Snapshot the compiled program.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let { name, value } => {
                // Define before compiling the value so a recursive function
                // resolves its own name.
                let symbol = self.symbols.define(name);
                self.compile_expr(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
            }
            Stmt::Return { value } => {
                self.compile_expr(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
            Stmt::Expr { expr } => {
                self.compile_expr(expr)?;
                // The only place OpPop is emitted: expression statements
                // discard their value.
                self.emit(Op::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError(format!("undefined variable {name}")))?;
                self.load_symbol(&symbol);
            }
            Expr::Integer(n) => {
                let index = self.add_constant(Value::Integer(*n));
                self.emit(Op::Constant, &[index]);
            }
            Expr::Str(s) => {
                let index = self.add_constant(Value::string(s.as_str()));
                self.emit(Op::Constant, &[index]);
            }
            Expr::Boolean(true) => {
                self.emit(Op::True, &[]);
            }
            Expr::Boolean(false) => {
                self.emit(Op::False, &[]);
            }
            Expr::Prefix { operator, right } => {
                self.compile_expr(right)?;
                match operator {
                    PrefixOp::Bang => self.emit(Op::Bang, &[]),
                    PrefixOp::Minus => self.emit(Op::Minus, &[]),
                };
            }
            Expr::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(*operator, left, right)?,
            Expr::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expr::Function {
                parameters,
                body,
                name,
            } => self.compile_function(parameters, body, name.as_deref())?,
            Expr::Call {
                function,
                arguments,
            } => {
                self.compile_expr(function)?;
                for argument in arguments {
                    self.compile_expr(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            Expr::Hash(pairs) => {
                // The parser keeps pairs in source order; re-order by the
                // keys' printed form so emission is reproducible.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }
            Expr::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, &[]);
            }
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: InfixOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), CompileError> {
        // There is no OpLessThan: `a < b` compiles its operands in reverse
        // and reuses OpGreaterThan.
        if operator == InfixOp::Lt {
            self.compile_expr(right)?;
            self.compile_expr(left)?;
            self.emit(Op::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        match operator {
            InfixOp::Add => self.emit(Op::Add, &[]),
            InfixOp::Sub => self.emit(Op::Sub, &[]),
            InfixOp::Mul => self.emit(Op::Mul, &[]),
            InfixOp::Div => self.emit(Op::Div, &[]),
            InfixOp::Gt => self.emit(Op::GreaterThan, &[]),
            InfixOp::Eq => self.emit(Op::Equal, &[]),
            InfixOp::NotEq => self.emit(Op::NotEqual, &[]),
            InfixOp::Lt => unreachable!("handled above"),
        };
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), CompileError> {
        trace!("compiling if expression");
        self.compile_expr(condition)?;

        // Placeholder operand, patched once the consequence is compiled.
        let jump_not_truthy_pos = self.emit(Op::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        // Keep the branch value on the stack: an if-expression produces
        // exactly one value regardless of the branch taken.
        if self.last_instruction_is(Op::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Op::Jump, &[9999]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            None => {
                self.emit(Op::Null, &[]);
            }
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);
        Ok(())
    }

    fn compile_function(
        &mut self,
        parameters: &[String],
        body: &Block,
        name: Option<&str>,
    ) -> Result<(), CompileError> {
        trace!(?name, "compiling function literal");
        self.enter_scope();

        if let Some(name) = name {
            self.symbols.define_function_name(name);
        }
        for parameter in parameters {
            self.symbols.define(parameter);
        }

        self.compile_block(body)?;

        // An implicit final expression becomes the return value; a body that
        // produces nothing returns null.
        if self.last_instruction_is(Op::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Op::ReturnValue) {
            self.emit(Op::Return, &[]);
        }

        let free_symbols = self.symbols.free_symbols().to_vec();
        let num_locals = self.symbols.num_definitions();
        let instructions = self.leave_scope();

        // Push each captured value in the enclosing scope; OpClosure moves
        // them into the closure object.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let index = self.add_constant(Value::Function(Rc::new(func)));
        self.emit(Op::Closure, &[index, free_symbols.len()]);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Symbol loads
    // ─────────────────────────────────────────────────────────────────────────

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Op::CurrentClosure, &[]),
        };
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Constants
    // ─────────────────────────────────────────────────────────────────────────

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Emission
    // ─────────────────────────────────────────────────────────────────────────

    /// Encode and append an instruction; returns its start offset.
    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let pos = self.add_instruction(&instruction);
        self.set_last_instruction(op, pos);
        pos
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope_mut();
        let pos = scope.instructions.len();
        scope.instructions.0.extend_from_slice(instruction);
        pos
    }

    fn set_last_instruction(&mut self, opcode: Op, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction.take();
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        matches!(
            self.current_scope().last_instruction,
            Some(EmittedInstruction { opcode, .. }) if opcode == op
        )
    }

    /// Strip a trailing OpPop, restoring the previous instruction as last.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction.take() {
            scope.instructions.0.truncate(last.position);
            scope.last_instruction = scope.previous_instruction.take();
        }
    }

    /// Overwrite same-length bytes in place.
    fn replace_instruction(&mut self, pos: usize, new_instruction: &[u8]) {
        let instructions = &mut self.current_scope_mut().instructions.0;
        instructions[pos..pos + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Re-encode the instruction at `op_pos` with a new operand.
    fn change_operand(&mut self, op_pos: usize, operand: usize) {
        let op = Op::try_from(self.current_scope().instructions.0[op_pos])
            .expect("change_operand positioned on an undefined opcode");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(op_pos, &new_instruction);
    }

    /// Rewrite a trailing OpPop into OpReturnValue (same width).
    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.current_scope().last_instruction {
            let new_instruction = make(Op::ReturnValue, &[]);
            self.replace_instruction(last.position, &new_instruction);
            if let Some(last) = &mut self.current_scope_mut().last_instruction {
                last.opcode = Op::ReturnValue;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scopes
    // ─────────────────────────────────────────────────────────────────────────

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbols.push_scope();
    }

    /// Pop the innermost scope and return its finished instructions.
    fn leave_scope(&mut self) -> Instructions {
        self.symbols.pop_scope();
        self.scopes
            .pop()
            .map(|scope| scope.instructions)
            .unwrap_or_default()
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("compilation scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes
            .last_mut()
            .expect("compilation scope stack is never empty")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
