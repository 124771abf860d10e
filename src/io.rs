// File: src/io.rs
//
// Bytecode image reader/writer for the Adder programming language.
// The on-disk format is big-endian throughout: tagged sections (version,
// constants, code), and tagged constant values where each tag is followed by
// one u16 length per operand and then the operand payloads. Images written
// by a newer build are rejected on read.

use crate::bytecode::Bytecode;
use crate::errors::{AdderError, ErrorKind};
use crate::value::{CompiledFunction, Value};
use std::path::Path;
use std::rc::Rc;

pub const BUILD_NUMBER: u16 = 3;
pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

// Section tags.
const HDR_VERSION: u8 = 0xF0;
const HDR_CONSTANTS: u8 = 0xF1;
const HDR_CODE: u8 = 0xF3;

// Constant value tags.
const DEF_INT: u8 = 0xA0;
const DEF_BOOL: u8 = 0xA1;
const DEF_STR: u8 = 0xA2;
const DEF_NULL: u8 = 0xA3;
const DEF_FUNC: u8 = 0xA4;

fn invalid(message: impl Into<String>) -> AdderError {
    AdderError::new(ErrorKind::InvalidBytecode, message)
}

/// Serializes a `Bytecode` into an image.
pub struct BytecodeWriter<'a> {
    bytecode: &'a Bytecode,
}

impl<'a> BytecodeWriter<'a> {
    pub fn new(bytecode: &'a Bytecode) -> Self {
        BytecodeWriter { bytecode }
    }

    pub fn write(&self) -> Result<Vec<u8>, AdderError> {
        let mut image = Vec::new();
        self.write_version(&mut image);
        self.write_constants(&mut image)?;
        self.write_code(&mut image)?;
        Ok(image)
    }

    fn write_version(&self, image: &mut Vec<u8>) {
        image.push(HDR_VERSION);
        image.extend_from_slice(&BUILD_NUMBER.to_be_bytes());
        image.extend_from_slice(&(VERSION_STRING.len() as u16).to_be_bytes());
        image.extend_from_slice(VERSION_STRING.as_bytes());
    }

    fn write_constants(&self, image: &mut Vec<u8>) -> Result<(), AdderError> {
        image.push(HDR_CONSTANTS);
        let count = u16::try_from(self.bytecode.constants.len())
            .map_err(|_| invalid("too many constants for image format"))?;
        image.extend_from_slice(&count.to_be_bytes());
        for constant in &self.bytecode.constants {
            deflate(constant, image)?;
        }
        Ok(())
    }

    fn write_code(&self, image: &mut Vec<u8>) -> Result<(), AdderError> {
        image.push(HDR_CODE);
        let length = u16::try_from(self.bytecode.instructions.len())
            .map_err(|_| invalid("code section too large for image format"))?;
        image.extend_from_slice(&length.to_be_bytes());
        image.extend_from_slice(&self.bytecode.instructions);
        Ok(())
    }
}

/// Append one tagged constant: tag, u16 length per operand, payloads.
fn deflate(constant: &Value, image: &mut Vec<u8>) -> Result<(), AdderError> {
    let operands: Vec<Vec<u8>> = match constant {
        Value::Int(i) => {
            let narrowed = i32::try_from(*i)
                .map_err(|_| invalid(format!("integer constant {} exceeds image range", i)))?;
            vec![narrowed.to_be_bytes().to_vec()]
        }
        Value::Bool(b) => vec![vec![u8::from(*b)]],
        Value::Str(s) => vec![s.as_bytes().to_vec()],
        Value::Null => Vec::new(),
        Value::CompiledFunction(function) => {
            let num_locals = i32::try_from(function.num_locals)
                .map_err(|_| invalid("function local count exceeds image range"))?;
            let num_parameters = i32::try_from(function.num_parameters)
                .map_err(|_| invalid("function parameter count exceeds image range"))?;
            vec![
                num_locals.to_be_bytes().to_vec(),
                num_parameters.to_be_bytes().to_vec(),
                function.instructions.clone(),
            ]
        }
        other => {
            return Err(invalid(format!("cannot serialize {} constant", other.type_name())))
        }
    };

    let tag = match constant {
        Value::Int(_) => DEF_INT,
        Value::Bool(_) => DEF_BOOL,
        Value::Str(_) => DEF_STR,
        Value::Null => DEF_NULL,
        Value::CompiledFunction(_) => DEF_FUNC,
        _ => unreachable!(),
    };
    image.push(tag);
    for operand in &operands {
        let length = u16::try_from(operand.len())
            .map_err(|_| invalid("constant payload too large for image format"))?;
        image.extend_from_slice(&length.to_be_bytes());
    }
    for operand in operands {
        image.extend_from_slice(&operand);
    }
    Ok(())
}

/// Deserializes an image back into `Bytecode`.
pub struct BytecodeReader {
    data: Vec<u8>,
    pointer: usize,
}

impl BytecodeReader {
    pub fn new(data: Vec<u8>) -> Self {
        BytecodeReader { data, pointer: 0 }
    }

    pub fn read(mut self) -> Result<Bytecode, AdderError> {
        let mut constants = Vec::new();
        let mut instructions = Vec::new();

        while self.pointer < self.data.len() {
            let header = self.take_u8()?;
            match header {
                HDR_VERSION => self.read_version()?,
                HDR_CONSTANTS => {
                    let count = self.take_u16()?;
                    for _ in 0..count {
                        constants.push(self.inflate()?);
                    }
                }
                HDR_CODE => {
                    let length = self.take_u16()?;
                    instructions = self.take_bytes(length)?.to_vec();
                }
                other => return Err(invalid(format!("unknown section tag 0x{:02X}", other))),
            }
        }

        Ok(Bytecode { instructions, constants })
    }

    fn read_version(&mut self) -> Result<(), AdderError> {
        let build_number = self.take_u16()? as u16;
        let version_len = self.take_u16()?;
        let _version_string = self.take_bytes(version_len)?;
        if build_number > BUILD_NUMBER {
            return Err(invalid(format!(
                "incompatible version: image build {} is newer than {}",
                build_number, BUILD_NUMBER
            )));
        }
        Ok(())
    }

    fn inflate(&mut self) -> Result<Value, AdderError> {
        let tag = self.take_u8()?;
        let operand_count = match tag {
            DEF_INT | DEF_BOOL | DEF_STR => 1,
            DEF_NULL => 0,
            DEF_FUNC => 3,
            other => return Err(invalid(format!("unknown constant tag 0x{:02X}", other))),
        };
        let mut lengths = Vec::with_capacity(operand_count);
        for _ in 0..operand_count {
            lengths.push(self.take_u16()?);
        }
        let mut chunks = Vec::with_capacity(operand_count);
        for length in lengths {
            chunks.push(self.take_bytes(length)?.to_vec());
        }

        match tag {
            DEF_INT => {
                let bytes: [u8; 4] = chunks[0]
                    .as_slice()
                    .try_into()
                    .map_err(|_| invalid("integer constant payload must be 4 bytes"))?;
                Ok(Value::Int(i32::from_be_bytes(bytes) as i64))
            }
            DEF_BOOL => match chunks[0].first() {
                Some(0) => Ok(Value::Bool(false)),
                Some(_) => Ok(Value::Bool(true)),
                None => Err(invalid("boolean constant payload is empty")),
            },
            DEF_STR => {
                let s = std::str::from_utf8(&chunks[0])
                    .map_err(|_| invalid("string constant is not valid UTF-8"))?;
                Ok(Value::str(s))
            }
            DEF_NULL => Ok(Value::Null),
            DEF_FUNC => {
                let num_locals: [u8; 4] = chunks[0]
                    .as_slice()
                    .try_into()
                    .map_err(|_| invalid("function local count must be 4 bytes"))?;
                let num_parameters: [u8; 4] = chunks[1]
                    .as_slice()
                    .try_into()
                    .map_err(|_| invalid("function parameter count must be 4 bytes"))?;
                Ok(Value::CompiledFunction(Rc::new(CompiledFunction {
                    instructions: chunks[2].clone(),
                    num_locals: i32::from_be_bytes(num_locals) as usize,
                    num_parameters: i32::from_be_bytes(num_parameters) as usize,
                })))
            }
            _ => unreachable!(),
        }
    }

    fn take_u8(&mut self) -> Result<u8, AdderError> {
        let byte = *self.data.get(self.pointer).ok_or_else(|| invalid("truncated image"))?;
        self.pointer += 1;
        Ok(byte)
    }

    fn take_u16(&mut self) -> Result<usize, AdderError> {
        if self.pointer + 2 > self.data.len() {
            return Err(invalid("truncated image"));
        }
        let value = u16::from_be_bytes([self.data[self.pointer], self.data[self.pointer + 1]]);
        self.pointer += 2;
        Ok(value as usize)
    }

    fn take_bytes(&mut self, length: usize) -> Result<&[u8], AdderError> {
        if self.pointer + length > self.data.len() {
            return Err(invalid("truncated image"));
        }
        let slice = &self.data[self.pointer..self.pointer + length];
        self.pointer += length;
        Ok(slice)
    }
}

/// Compile-to-file support for the CLI.
pub fn write_file(path: &Path, bytecode: &Bytecode) -> Result<(), AdderError> {
    let image = BytecodeWriter::new(bytecode).write()?;
    std::fs::write(path, image).map_err(|e| {
        AdderError::new(ErrorKind::Runtime, format!("cannot write {}: {}", path.display(), e))
    })
}

pub fn read_file(path: &Path) -> Result<Bytecode, AdderError> {
    let data = std::fs::read(path).map_err(|e| {
        AdderError::new(ErrorKind::Runtime, format!("cannot read {}: {}", path.display(), e))
    })?;
    BytecodeReader::new(data).read()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{make, Op};

    fn sample_bytecode() -> Bytecode {
        let mut instructions = Vec::new();
        instructions.extend(make(Op::Constant, &[0]));
        instructions.extend(make(Op::Constant, &[1]));
        instructions.extend(make(Op::Add, &[]));
        instructions.extend(make(Op::Pop, &[]));
        Bytecode {
            instructions,
            constants: vec![
                Value::Int(-7),
                Value::str("monkey"),
                Value::Bool(true),
                Value::Null,
                Value::CompiledFunction(Rc::new(CompiledFunction {
                    instructions: make(Op::Null, &[]),
                    num_locals: 2,
                    num_parameters: 1,
                })),
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let original = sample_bytecode();
        let image = BytecodeWriter::new(&original).write().expect("writes");
        let read = BytecodeReader::new(image).read().expect("reads");

        assert_eq!(read.instructions, original.instructions);
        assert_eq!(read.constants.len(), original.constants.len());
        assert_eq!(read.constants[0], Value::Int(-7));
        assert_eq!(read.constants[1], Value::str("monkey"));
        assert_eq!(read.constants[2], Value::Bool(true));
        assert_eq!(read.constants[3], Value::Null);
        match &read.constants[4] {
            Value::CompiledFunction(function) => {
                assert_eq!(function.num_locals, 2);
                assert_eq!(function.num_parameters, 1);
                assert_eq!(function.instructions, make(Op::Null, &[]));
            }
            other => panic!("expected compiled function, got {:?}", other),
        }
    }

    #[test]
    fn test_newer_build_is_rejected() {
        let mut image = Vec::new();
        image.push(0xF0);
        image.extend_from_slice(&(BUILD_NUMBER + 1).to_be_bytes());
        image.extend_from_slice(&0u16.to_be_bytes());
        let error = BytecodeReader::new(image).read().expect_err("must reject");
        assert_eq!(error.kind, ErrorKind::InvalidBytecode);
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let original = sample_bytecode();
        let mut image = BytecodeWriter::new(&original).write().expect("writes");
        image.truncate(image.len() - 3);
        assert!(BytecodeReader::new(image).read().is_err());
    }
}
