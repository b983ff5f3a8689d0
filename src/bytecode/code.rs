use std::fmt;

/// One byte opcodes. Operands follow the opcode as big-endian `u16`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Pushes the constant at the operand index.
    Constant,
    GetGlobal,
    /// Pops the stack top into the global slot at the operand index.
    SetGlobal,
    /// Discards the top N stack values.
    Drop,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    True,
    False,
    Not,
    Minus,
    Equal,
    NotEqual,
    NumLess,
    NumLessEqual,
    NumGreater,
    NumGreaterEqual,
    StringLess,
    StringLessEqual,
    StringGreater,
    StringGreaterEqual,
    StringConcatenate,
    /// Pops N elements into a new array.
    Array,
    ArrayConcatenate,
    /// Pops N values, alternating keys and values, into a new map.
    Map,
    Index,
    /// Pops index, container and value and stores the value.
    SetIndex,
    /// Pops end, start and the sliced value. Missing bounds are `None`.
    Slice,
    /// Placeholder for an omitted optional value.
    None,
    Jump,
    /// Pops a bool and jumps if it is false.
    JumpNotTruthy,
    /// Pops step, stop and start and pushes a numeric range iterator.
    StepRange,
    /// Advances the iterator on top of the stack, turning an array, string
    /// or map into one first. Operands: whether the loop has a variable
    /// to push the element for, and the exit address taken after popping
    /// an exhausted iterator.
    IterRange,
}

const OPCODES: [Opcode; 35] = [
    Opcode::Constant,
    Opcode::GetGlobal,
    Opcode::SetGlobal,
    Opcode::Drop,
    Opcode::Add,
    Opcode::Subtract,
    Opcode::Multiply,
    Opcode::Divide,
    Opcode::Modulo,
    Opcode::True,
    Opcode::False,
    Opcode::Not,
    Opcode::Minus,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::NumLess,
    Opcode::NumLessEqual,
    Opcode::NumGreater,
    Opcode::NumGreaterEqual,
    Opcode::StringLess,
    Opcode::StringLessEqual,
    Opcode::StringGreater,
    Opcode::StringGreaterEqual,
    Opcode::StringConcatenate,
    Opcode::Array,
    Opcode::ArrayConcatenate,
    Opcode::Map,
    Opcode::Index,
    Opcode::SetIndex,
    Opcode::Slice,
    Opcode::None,
    Opcode::Jump,
    Opcode::JumpNotTruthy,
    Opcode::StepRange,
    Opcode::IterRange,
];

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        OPCODES.get(byte as usize).copied()
    }

    /// Byte width of each operand.
    pub fn operand_widths(self) -> &'static [usize] {
        match self {
            Opcode::Constant
            | Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::Drop
            | Opcode::Array
            | Opcode::Map
            | Opcode::Jump
            | Opcode::JumpNotTruthy => &[2],
            Opcode::IterRange => &[2, 2],
            _ => &[],
        }
    }

    /// Length of the encoded instruction including the opcode byte.
    pub fn len(self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op{:?}", self)
    }
}

/// Encodes one instruction. Missing operands are written as zero.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let mut ins = Vec::with_capacity(op.len());
    ins.push(op as u8);
    for (i, width) in op.operand_widths().iter().enumerate() {
        let operand = operands.get(i).copied().unwrap_or(0);
        if *width == 2 {
            ins.extend_from_slice(&(operand as u16).to_be_bytes());
        }
    }
    ins
}

pub fn read_u16(ins: &[u8], offset: usize) -> usize {
    match ins.get(offset..offset + 2) {
        Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]) as usize,
        _ => 0,
    }
}

/// Reads the operands of `op` starting at `offset`, returning them and
/// the number of bytes read.
pub fn read_operands(op: Opcode, ins: &[u8], offset: usize) -> (Vec<usize>, usize) {
    let mut operands = Vec::new();
    let mut read = 0;
    for width in op.operand_widths() {
        if *width == 2 {
            operands.push(read_u16(ins, offset + read));
        }
        read += width;
    }
    (operands, read)
}

/// A flat instruction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, ins: &[u8]) -> usize {
        let pos = self.0.len();
        self.0.extend_from_slice(ins);
        pos
    }

    /// Overwrites operand number `n` of the instruction at `pos`.
    pub fn change_operand(&mut self, pos: usize, n: usize, operand: usize) {
        let Some(op) = self.0.get(pos).and_then(|b| Opcode::from_byte(*b)) else {
            return;
        };
        let offset = pos + 1 + op.operand_widths().iter().take(n).sum::<usize>();
        if let Some(slot) = self.0.get_mut(offset..offset + 2) {
            slot.copy_from_slice(&(operand as u16).to_be_bytes());
        }
    }
}

impl From<Vec<Vec<u8>>> for Instructions {
    fn from(parts: Vec<Vec<u8>>) -> Self {
        Instructions(parts.concat())
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut i = 0;
        while i < self.0.len() {
            let Some(op) = Opcode::from_byte(self.0[i]) else {
                writeln!(f, "{:04} ERROR: unknown opcode {}", i, self.0[i])?;
                i += 1;
                continue;
            };
            let (operands, read) = read_operands(op, &self.0, i + 1);
            write!(f, "{:04} {}", i, op)?;
            for operand in operands {
                write!(f, " {}", operand)?;
            }
            writeln!(f)?;
            i += 1 + read;
        }
        Ok(())
    }
}
