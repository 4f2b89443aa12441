//! Compiled formula bytecode.
//!
//! A `Program` is the postfix instruction sequence for one register's
//! formula. Programs are only produced by the compiler, which guarantees
//! that evaluation never underflows the operand stack and leaves exactly
//! one value behind.

use crate::register::Register;
use std::fmt;

/// Arithmetic operators understood by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Binary `+`.
    Add,
    /// Binary `-`.
    Sub,
    /// Binary `*`.
    Mul,
    /// Binary `/`.
    Div,
    /// Prefix `-`.
    Negate,
    /// Postfix `^`, squares its operand.
    Square,
}

impl OpCode {
    /// Number of operands consumed from the stack.
    pub fn arity(self) -> usize {
        match self {
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => 2,
            OpCode::Negate | OpCode::Square => 1,
        }
    }

    /// Binding strength before bracket nesting is applied.
    pub(crate) fn priority(self) -> usize {
        match self {
            OpCode::Add | OpCode::Sub | OpCode::Negate => 0,
            OpCode::Mul | OpCode::Div => 1,
            OpCode::Square => 2,
        }
    }

    /// Symbol used in dumps. Negation prints as `_` to tell it apart from `-`.
    pub fn symbol(self) -> &'static str {
        match self {
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Negate => "_",
            OpCode::Square => "^",
        }
    }
}

/// One bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    /// Push a literal.
    Constant(f32),
    /// Push the current value of a register.
    Load(Register),
    /// Apply an operator to the top of the stack.
    Op(OpCode),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Constant(c) => write!(f, "{c}"),
            Instruction::Load(r) => write!(f, "{r}"),
            Instruction::Op(op) => f.write_str(op.symbol()),
        }
    }
}

/// Compiled formula computing the value of one output register.
///
/// # Examples
///
/// ```rust
/// use zzattrib::compile;
///
/// let program = compile("R1*2+1").unwrap();
/// assert_eq!(program.to_string(), "R1 2 * 1 +");
/// assert_eq!(program.depth(), 2);
///
/// let mut registers = vec![0.0; 2];
/// registers[1] = 4.0;
/// assert_eq!(program.evaluate(&registers), 9.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    output: Register,
    instructions: Vec<Instruction>,
    depth: usize,
}

impl Program {
    pub(crate) fn new(instructions: Vec<Instruction>, depth: usize) -> Self {
        Self {
            output: Register::new(0),
            instructions,
            depth,
        }
    }

    pub(crate) fn bind(mut self, output: Register) -> Self {
        self.output = output;
        self
    }

    /// The register this program writes. Unbound programs report `R0`.
    pub fn output(&self) -> Register {
        self.output
    }

    /// The instruction sequence in evaluation order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Peak operand stack depth needed to evaluate this program.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Registers read by this program, in instruction order (may repeat).
    pub fn reads(&self) -> impl Iterator<Item = Register> + '_ {
        self.instructions.iter().filter_map(|ins| match ins {
            Instruction::Load(r) => Some(*r),
            _ => None,
        })
    }

    /// Highest register index mentioned by this program, output included.
    pub fn max_register(&self) -> Register {
        self.reads().fold(self.output, Register::max)
    }

    /// Run the program against a register file and return its result.
    ///
    /// # Panics
    ///
    /// Panics if a loaded register lies outside `registers`. Programs
    /// obtained from the compiler cannot underflow the stack; evaluation
    /// asserts this as an internal invariant.
    pub fn evaluate(&self, registers: &[f32]) -> f32 {
        let mut stack: Vec<f32> = Vec::with_capacity(self.depth);
        for ins in &self.instructions {
            match *ins {
                Instruction::Constant(c) => stack.push(c),
                Instruction::Load(r) => stack.push(registers[r.index()]),
                Instruction::Op(op) if op.arity() == 2 => {
                    let rhs = pop(&mut stack);
                    let lhs = pop(&mut stack);
                    stack.push(match op {
                        OpCode::Add => lhs + rhs,
                        OpCode::Sub => lhs - rhs,
                        OpCode::Mul => lhs * rhs,
                        _ => lhs / rhs,
                    });
                }
                Instruction::Op(op) => {
                    let v = pop(&mut stack);
                    stack.push(match op {
                        OpCode::Negate => -v,
                        _ => v * v,
                    });
                }
            }
        }
        assert_eq!(stack.len(), 1, "program left {} values on the stack", stack.len());
        stack[0]
    }
}

fn pop(stack: &mut Vec<f32>) -> f32 {
    match stack.pop() {
        Some(v) => v,
        None => panic!("operand stack underflow"),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ins) in self.instructions.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{ins}")?;
        }
        Ok(())
    }
}
