//! Basis-State Reference Engine
//!
//! A small engine that tracks each qubit as a classical bit. It understands
//! a classical subset of Quil, which is enough to drive persistent sessions
//! end to end:
//!
//! ```text
//! DECLARE flag BIT[1]
//! X 0
//! MEASURE 0 ro[0]
//! WAIT
//! MOVE flag[0] ro[0]
//! ```
//!
//! Gates that would leave the computational basis are rejected.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

use super::{Engine, EngineError, PauseNotifier, PauseOutcome};

/// Name of the readout region every engine starts with
pub const READOUT_REGION: &str = "ro";

/// Largest region a program may declare
pub const MAX_REGION_LENGTH: usize = 1 << 20;

/// Classical memory region type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    Bit,
    Octet,
    Integer,
}

impl RegionType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "BIT" => Some(Self::Bit),
            "OCTET" => Some(Self::Octet),
            "INTEGER" => Some(Self::Integer),
            _ => None,
        }
    }

    fn accepts(self, value: i64) -> bool {
        match self {
            Self::Bit => matches!(value, 0 | 1),
            Self::Octet => (0..=255).contains(&value),
            Self::Integer => true,
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit => write!(f, "BIT"),
            Self::Octet => write!(f, "OCTET"),
            Self::Integer => write!(f, "INTEGER"),
        }
    }
}

#[derive(Debug, Clone)]
struct Region {
    region_type: RegionType,
    values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryRef {
    name: String,
    index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Literal(i64),
    Ref(MemoryRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Instruction {
    Declare {
        name: String,
        region_type: RegionType,
        length: usize,
    },
    Identity(usize),
    Flip(usize),
    Reset(Option<usize>),
    Measure {
        qubit: usize,
        target: Option<MemoryRef>,
    },
    Move {
        target: MemoryRef,
        source: Operand,
    },
    Not(MemoryRef),
    Wait,
    Halt,
}

#[derive(Debug)]
struct Machine {
    qubits: Vec<bool>,
    memory: HashMap<String, Region>,
}

impl Machine {
    fn region(&self, name: &str) -> Result<&Region, EngineError> {
        self.memory
            .get(name)
            .ok_or_else(|| EngineError::UnknownRegion(name.to_string()))
    }

    fn read(&self, name: &str, index: usize) -> Result<i64, EngineError> {
        let region = self.region(name)?;
        region
            .values
            .get(index)
            .copied()
            .ok_or_else(|| EngineError::IndexOutOfBounds {
                name: name.to_string(),
                index,
                length: region.values.len(),
            })
    }

    fn check_write(&self, name: &str, index: usize, value: i64) -> Result<(), EngineError> {
        let region = self.region(name)?;
        if index >= region.values.len() {
            return Err(EngineError::IndexOutOfBounds {
                name: name.to_string(),
                index,
                length: region.values.len(),
            });
        }
        if !region.region_type.accepts(value) {
            return Err(EngineError::ValueOutOfRange {
                name: name.to_string(),
                region_type: region.region_type.to_string(),
                value,
            });
        }
        Ok(())
    }

    fn write(&mut self, name: &str, index: usize, value: i64) -> Result<(), EngineError> {
        self.check_write(name, index, value)?;
        if let Some(region) = self.memory.get_mut(name) {
            region.values[index] = value;
        }
        Ok(())
    }

    fn operand(&self, operand: &Operand) -> Result<i64, EngineError> {
        match operand {
            Operand::Literal(value) => Ok(*value),
            Operand::Ref(r) => self.read(&r.name, r.index),
        }
    }

    fn execute(&mut self, instruction: &Instruction) -> Result<(), EngineError> {
        match instruction {
            Instruction::Declare {
                name,
                region_type,
                length,
            } => match self.memory.get(name) {
                Some(existing)
                    if existing.region_type == *region_type
                        && existing.values.len() == *length => {}
                Some(_) => return Err(EngineError::RegionConflict(name.clone())),
                None => {
                    self.memory.insert(
                        name.clone(),
                        Region {
                            region_type: *region_type,
                            values: vec![0; *length],
                        },
                    );
                }
            },
            Instruction::Identity(_) => {}
            Instruction::Flip(qubit) => self.qubits[*qubit] = !self.qubits[*qubit],
            Instruction::Reset(Some(qubit)) => self.qubits[*qubit] = false,
            Instruction::Reset(None) => self.qubits.iter_mut().for_each(|q| *q = false),
            Instruction::Measure { qubit, target } => {
                let bit = i64::from(self.qubits[*qubit]);
                if let Some(target) = target {
                    self.write(&target.name, target.index, bit)?;
                }
            }
            Instruction::Move { target, source } => {
                let value = self.operand(source)?;
                self.write(&target.name, target.index, value)?;
            }
            Instruction::Not(target) => {
                let region_type = self.region(&target.name)?.region_type;
                let value = self.read(&target.name, target.index)?;
                let flipped = match region_type {
                    RegionType::Bit => 1 - value,
                    RegionType::Octet => 255 - value,
                    RegionType::Integer => !value,
                };
                self.write(&target.name, target.index, flipped)?;
            }
            Instruction::Wait | Instruction::Halt => {}
        }
        Ok(())
    }
}

/// Engine holding qubits in computational basis states
pub struct BasisStateEngine {
    num_qubits: usize,
    machine: Mutex<Machine>,
}

impl BasisStateEngine {
    /// Create an engine with all qubits in |0> and an `ro BIT[num_qubits]` region
    pub fn new(num_qubits: usize) -> Self {
        let mut memory = HashMap::new();
        memory.insert(
            READOUT_REGION.to_string(),
            Region {
                region_type: RegionType::Bit,
                values: vec![0; num_qubits],
            },
        );

        Self {
            num_qubits,
            machine: Mutex::new(Machine {
                qubits: vec![false; num_qubits],
                memory,
            }),
        }
    }

    #[cfg(test)]
    fn qubit(&self, qubit: usize) -> Option<bool> {
        self.machine.lock().qubits.get(qubit).copied()
    }
}

impl Engine for BasisStateEngine {
    fn kind(&self) -> &'static str {
        "basis-state"
    }

    fn number_of_qubits(&self) -> usize {
        self.num_qubits
    }

    fn memory_ref(&self, name: &str, index: usize) -> Result<i64, EngineError> {
        self.machine.lock().read(name, index)
    }

    fn set_memory_ref(&self, name: &str, index: usize, value: i64) -> Result<(), EngineError> {
        self.machine.lock().write(name, index, value)
    }

    fn validate_memory_write(&self, name: &str, index: usize, value: i64) -> Result<(), EngineError> {
        self.machine.lock().check_write(name, index, value)
    }

    fn run(&self, program: &str, pause: &mut dyn PauseNotifier) -> Result<(), EngineError> {
        let instructions = parse_program(program, self.num_qubits)?;
        debug!("Executing {} instructions", instructions.len());

        for instruction in &instructions {
            match instruction {
                // The machine lock is not held here so memory calls can
                // proceed while paused.
                Instruction::Wait => {
                    if pause.pause() == PauseOutcome::Cancelled {
                        return Err(EngineError::Cancelled);
                    }
                }
                Instruction::Halt => break,
                other => self.machine.lock().execute(other)?,
            }
        }
        Ok(())
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> EngineError {
    EngineError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_program(program: &str, num_qubits: usize) -> Result<Vec<Instruction>, EngineError> {
    let mut instructions = Vec::new();
    for (index, raw) in program.lines().enumerate() {
        if let Some(instruction) = parse_line(raw, index + 1, num_qubits)? {
            instructions.push(instruction);
        }
    }
    Ok(instructions)
}

fn parse_line(raw: &str, line: usize, num_qubits: usize) -> Result<Option<Instruction>, EngineError> {
    let code = raw.split('#').next().unwrap_or_default();
    let words: Vec<&str> = code.split_whitespace().collect();
    let Some((&mnemonic, args)) = words.split_first() else {
        return Ok(None);
    };

    let qubit = |word: &str| -> Result<usize, EngineError> {
        let qubit: usize = word
            .parse()
            .map_err(|_| parse_error(line, format!("invalid qubit index {:?}", word)))?;
        if qubit >= num_qubits {
            return Err(EngineError::QubitOutOfRange {
                qubit,
                available: num_qubits,
            });
        }
        Ok(qubit)
    };
    let arity = |expected: usize| -> Result<(), EngineError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(parse_error(
                line,
                format!("{} expects {} argument(s), got {}", mnemonic, expected, args.len()),
            ))
        }
    };

    let instruction = match mnemonic {
        "DECLARE" => {
            arity(2)?;
            let name = args[0];
            if !is_identifier(name) {
                return Err(parse_error(line, format!("invalid region name {:?}", name)));
            }
            let (type_name, length) = parse_type_spec(args[1])
                .ok_or_else(|| parse_error(line, format!("invalid type {:?}", args[1])))?;
            if length > MAX_REGION_LENGTH {
                return Err(parse_error(
                    line,
                    format!("region {} too long: {} > {}", name, length, MAX_REGION_LENGTH),
                ));
            }
            let region_type = RegionType::parse(type_name)
                .ok_or_else(|| EngineError::Unsupported(format!("DECLARE of type {}", type_name)))?;
            Instruction::Declare {
                name: name.to_string(),
                region_type,
                length,
            }
        }
        "I" => {
            arity(1)?;
            Instruction::Identity(qubit(args[0])?)
        }
        "X" => {
            arity(1)?;
            Instruction::Flip(qubit(args[0])?)
        }
        "RESET" => match args {
            [] => Instruction::Reset(None),
            [q] => Instruction::Reset(Some(qubit(*q)?)),
            _ => return Err(parse_error(line, "RESET takes at most one qubit")),
        },
        "MEASURE" => match args {
            [q] => Instruction::Measure {
                qubit: qubit(*q)?,
                target: None,
            },
            [q, target] => Instruction::Measure {
                qubit: qubit(*q)?,
                target: Some(parse_ref(*target).ok_or_else(|| {
                    parse_error(line, format!("invalid memory reference {:?}", target))
                })?),
            },
            _ => return Err(parse_error(line, "MEASURE takes a qubit and an optional target")),
        },
        "MOVE" => {
            arity(2)?;
            let target = parse_ref(args[0])
                .ok_or_else(|| parse_error(line, format!("invalid memory reference {:?}", args[0])))?;
            let source = match args[1].parse::<i64>() {
                Ok(value) => Operand::Literal(value),
                Err(_) => Operand::Ref(parse_ref(args[1]).ok_or_else(|| {
                    parse_error(line, format!("invalid operand {:?}", args[1]))
                })?),
            };
            Instruction::Move { target, source }
        }
        "NOT" => {
            arity(1)?;
            Instruction::Not(
                parse_ref(args[0])
                    .ok_or_else(|| parse_error(line, format!("invalid memory reference {:?}", args[0])))?,
            )
        }
        "WAIT" => {
            arity(0)?;
            Instruction::Wait
        }
        "HALT" => {
            arity(0)?;
            Instruction::Halt
        }
        other => return Err(EngineError::Unsupported(other.to_string())),
    };

    Ok(Some(instruction))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `BIT` or `BIT[4]`
fn parse_type_spec(spec: &str) -> Option<(&str, usize)> {
    match spec.split_once('[') {
        None => Some((spec, 1)),
        Some((name, rest)) => {
            let length = rest.strip_suffix(']')?.parse().ok()?;
            Some((name, length))
        }
    }
}

/// `ro[3]`, or a bare `ro` meaning index 0
fn parse_ref(word: &str) -> Option<MemoryRef> {
    let (name, index) = match word.split_once('[') {
        None => (word, 0),
        Some((name, rest)) => (name, rest.strip_suffix(']')?.parse().ok()?),
    };
    if !is_identifier(name) {
        return None;
    }
    Some(MemoryRef {
        name: name.to_string(),
        index,
    })
}
