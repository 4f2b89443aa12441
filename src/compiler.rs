//! Formula compiler.
//!
//! Turns formula text such as `-(-R1*(2+R3/(1.2-0.3)))` into a postfix
//! `Program` in a single left-to-right scan. Operators wait on a pending
//! stack keyed by their level: intrinsic priority plus a fixed offset per
//! open bracket, so anything inside brackets outranks anything outside.

use crate::error::CompileError;
use crate::limits::Limits;
use crate::program::{Instruction, OpCode, Program};
use crate::register::Register;

/// Level offset added per open bracket. Larger than any intrinsic priority.
const BRACKET_LEVEL: usize = 8;

/// An operator waiting for its right-hand side.
#[derive(Debug, Clone, Copy)]
struct Pending {
    op: OpCode,
    level: usize,
}

/// Output buffer that tracks the live operand height while emitting.
///
/// Emission order is evaluation order, so the tracked height is exactly
/// the evaluator's stack height at each instruction.
struct Emitter {
    instructions: Vec<Instruction>,
    height: usize,
    peak: usize,
    max_depth: usize,
    max_len: usize,
}

impl Emitter {
    fn new(limits: &Limits) -> Self {
        Self {
            instructions: Vec::new(),
            height: 0,
            peak: 0,
            max_depth: limits.stack_depth_max,
            max_len: limits.program_max,
        }
    }

    fn push(&mut self, ins: Instruction) -> Result<(), CompileError> {
        if self.instructions.len() >= self.max_len {
            return Err(CompileError::ProgramCapacity { max: self.max_len });
        }
        self.instructions.push(ins);
        Ok(())
    }

    fn operand(&mut self, ins: Instruction) -> Result<(), CompileError> {
        if self.height >= self.max_depth {
            return Err(CompileError::StackCapacity {
                max: self.max_depth,
            });
        }
        self.push(ins)?;
        self.height += 1;
        self.peak = self.peak.max(self.height);
        Ok(())
    }

    fn operator(&mut self, op: OpCode) -> Result<(), CompileError> {
        let arity = op.arity();
        if self.height < arity {
            return Err(CompileError::OperatorSyntax);
        }
        self.push(Instruction::Op(op))?;
        self.height -= arity - 1;
        Ok(())
    }

    /// Emit every pending operator whose level is at least `level`.
    fn flush(&mut self, pending: &mut Vec<Pending>, level: usize) -> Result<(), CompileError> {
        while let Some(top) = pending.last().copied() {
            if top.level < level {
                break;
            }
            pending.pop();
            self.operator(top.op)?;
        }
        Ok(())
    }
}

/// Compile a formula with the default limits.
///
/// # Examples
///
/// ```rust
/// use zzattrib::{compile, CompileError};
///
/// let program = compile("R3^").unwrap();
/// assert_eq!(program.to_string(), "R3 ^");
///
/// assert_eq!(compile("R3+").unwrap_err(), CompileError::OperatorSyntax);
/// assert_eq!(compile(")").unwrap_err(), CompileError::OpenBracketMismatch);
/// assert_eq!(compile("").unwrap_err(), CompileError::EmptyExpression);
/// ```
pub fn compile(text: &str) -> Result<Program, CompileError> {
    compile_with_limits(text, &Limits::default())
}

/// Compile a formula under custom limits.
///
/// The operand stack and the pending-operator stack are both bounded by
/// `limits.stack_depth_max`; the instruction count by `limits.program_max`.
///
/// # Examples
///
/// ```rust
/// use zzattrib::{compile_with_limits, CompileError, Limits};
///
/// let limits = Limits {
///     program_max: 4,
///     ..Limits::default()
/// };
/// assert!(compile_with_limits("R0*R1", &limits).is_ok());
/// assert_eq!(
///     compile_with_limits("R0*R1+1", &limits).unwrap_err(),
///     CompileError::ProgramCapacity { max: 4 }
/// );
/// ```
pub fn compile_with_limits(text: &str, limits: &Limits) -> Result<Program, CompileError> {
    let bytes = text.as_bytes();
    let max_depth = limits.stack_depth_max;
    let mut out = Emitter::new(limits);
    let mut pending: Vec<Pending> = Vec::new();
    let mut base = 0usize;
    let mut operands = 0usize;
    // A '-' seen while this is set is negation rather than subtraction.
    let mut expect_operand = true;
    // Set once an operator other than negation is pending in the current
    // bracket; a negation after it must bind as tightly as '*' and '/'.
    let mut after_operator = false;
    let mut pos = 0usize;

    while let Some(&c) = bytes.get(pos) {
        match c {
            b'R' => {
                pos += 1;
                let start = pos;
                pos = skip_digits(bytes, pos);
                if start == pos {
                    return Err(CompileError::RegisterSyntax);
                }
                let index: u32 = text[start..pos]
                    .parse()
                    .map_err(|_| CompileError::RegisterSyntax)?;
                out.operand(Instruction::Load(Register::new(index)))?;
                operands += 1;
                expect_operand = false;
            }
            b'0'..=b'9' | b'.' => {
                let start = pos;
                pos = skip_digits(bytes, pos);
                if bytes.get(pos) == Some(&b'.') {
                    pos = skip_digits(bytes, pos + 1);
                }
                let value: f32 = text[start..pos]
                    .parse()
                    .map_err(|_| CompileError::InvalidCharacter)?;
                out.operand(Instruction::Constant(value))?;
                operands += 1;
                expect_operand = false;
            }
            b'(' => {
                pos += 1;
                base += BRACKET_LEVEL;
                expect_operand = true;
                after_operator = false;
            }
            b')' => {
                pos += 1;
                base = base
                    .checked_sub(BRACKET_LEVEL)
                    .ok_or(CompileError::OpenBracketMismatch)?;
                expect_operand = false;
            }
            b'+' | b'-' | b'*' | b'/' | b'^' => {
                pos += 1;
                let op = match c {
                    b'+' => OpCode::Add,
                    b'-' if expect_operand => OpCode::Negate,
                    b'-' => OpCode::Sub,
                    b'*' => OpCode::Mul,
                    b'/' => OpCode::Div,
                    _ => OpCode::Square,
                };
                // Prefix negation has no left operand, so it never flushes.
                let level = if op != OpCode::Negate {
                    let level = base + op.priority();
                    out.flush(&mut pending, level)?;
                    after_operator = true;
                    level
                } else if after_operator {
                    base + OpCode::Mul.priority()
                } else {
                    base + op.priority()
                };
                if pending.len() >= max_depth {
                    return Err(CompileError::StackCapacity { max: max_depth });
                }
                pending.push(Pending { op, level });
                expect_operand = true;
            }
            _ => return Err(CompileError::InvalidCharacter),
        }
    }

    if base != 0 {
        return Err(CompileError::CloseBracketMismatch);
    }
    if operands == 0 {
        return Err(CompileError::EmptyExpression);
    }
    out.flush(&mut pending, 0)?;
    if out.height != 1 {
        return Err(CompileError::OperatorSyntax);
    }
    Ok(Program::new(out.instructions, out.peak))
}

fn skip_digits(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    pos
}
