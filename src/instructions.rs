use crate::error::Result;
use crate::serial_driver::Frame;

/// Reserved id every servo on the bus listens to.
pub const BROADCAST_ID: u8 = 0xFE;
/// Highest id a single servo can be addressed by.
pub const MAX_ID: u8 = 0xFD;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Opcode {
    Ping = 0x01,
    ReadRegister = 0x02,
    WriteRegister = 0x03,
    SyncWriteRegister = 0x83,
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        opcode as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Opcode::Ping),
            0x02 => Ok(Opcode::ReadRegister),
            0x03 => Ok(Opcode::WriteRegister),
            0x83 => Ok(Opcode::SyncWriteRegister),
            other => Err(other),
        }
    }
}

/// Complement of the byte sum, truncated to one byte.
///
/// `payload` runs from the id byte through the last parameter byte.
pub fn calc_checksum(payload: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for b in payload {
        sum = sum.wrapping_add(*b);
    }
    !sum
}

/// Error bits a servo reports in the status byte of its reply.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct StatusError {
    instruction_error: bool,
    overload_error: bool,
    checksum_error: bool,
    range_error: bool,
    overheating_error: bool,
    angle_limit_error: bool,
    input_voltage_error: bool,
}

impl StatusError {
    pub fn from_flag(flag: u8) -> Option<StatusError> {
        if flag == 0 {
            return None;
        }
        Some(StatusError {
            input_voltage_error: flag & (1 << 0) != 0,
            angle_limit_error: flag & (1 << 1) != 0,
            overheating_error: flag & (1 << 2) != 0,
            range_error: flag & (1 << 3) != 0,
            checksum_error: flag & (1 << 4) != 0,
            overload_error: flag & (1 << 5) != 0,
            instruction_error: flag & (1 << 6) != 0,
        })
    }
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut description = String::new();
        if self.input_voltage_error {
            description.push_str("input_voltage_error ");
        }
        if self.angle_limit_error {
            description.push_str("angle_limit_error ");
        }
        if self.overheating_error {
            description.push_str("overheating_error ");
        }
        if self.range_error {
            description.push_str("range_error ");
        }
        if self.checksum_error {
            description.push_str("checksum_error ");
        }
        if self.overload_error {
            description.push_str("overload_error ");
        }
        if self.instruction_error {
            description.push_str("instruction_error ");
        }
        write!(f, "{}", description)
    }
}

impl std::error::Error for StatusError {}

/// One `{id, value}` group of a sync write.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SyncCommand {
    id: u8,
    value: u32,
}

impl SyncCommand {
    pub fn new(id: u8, value: u32) -> SyncCommand {
        SyncCommand { id, value }
    }
}

impl From<(u8, u32)> for SyncCommand {
    fn from(input: (u8, u32)) -> Self {
        let (id, val) = input;
        SyncCommand::new(id, val)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Instruction {
    Ping {
        id: u8,
    },
    Read {
        id: u8,
        addr: u8,
        length: u8,
    },
    Write {
        id: u8,
        addr: u8,
        data: Vec<u8>,
    },
    /// Always addressed to [`BROADCAST_ID`]; every device picks its own group.
    SyncWrite {
        addr: u8,
        data_len: u8,
        commands: Vec<SyncCommand>,
    },
}

impl Instruction {
    pub fn ping(id: u8) -> Instruction {
        Instruction::Ping { id }
    }

    pub fn read(id: u8, addr: u8, length: u8) -> Instruction {
        Instruction::Read { id, addr, length }
    }

    pub fn write_u8(id: u8, addr: u8, value: u8) -> Instruction {
        Instruction::Write {
            id,
            addr,
            data: vec![value],
        }
    }

    pub fn write_u16(id: u8, addr: u8, value: u16) -> Instruction {
        Instruction::Write {
            id,
            addr,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn sync_write<T: Into<SyncCommand>>(addr: u8, data_len: u8, commands: Vec<T>) -> Instruction {
        Instruction::SyncWrite {
            addr,
            data_len,
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Instruction::Ping { id } | Instruction::Read { id, .. } | Instruction::Write { id, .. } => *id,
            Instruction::SyncWrite { .. } => BROADCAST_ID,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Ping { .. } => Opcode::Ping,
            Instruction::Read { .. } => Opcode::ReadRegister,
            Instruction::Write { .. } => Opcode::WriteRegister,
            Instruction::SyncWrite { .. } => Opcode::SyncWriteRegister,
        }
    }

    pub fn params(&self) -> Vec<u8> {
        match self {
            Instruction::Ping { .. } => vec![],
            Instruction::Read { addr, length, .. } => vec![*addr, *length],
            Instruction::Write { addr, data, .. } => {
                let mut params = Vec::with_capacity(data.len() + 1);
                params.push(*addr);
                params.extend_from_slice(data);
                params
            }
            Instruction::SyncWrite {
                addr,
                data_len,
                commands,
            } => {
                let mut params = Vec::with_capacity(2 + commands.len() * (*data_len as usize + 1));
                params.push(*addr);
                params.push(*data_len);
                for entry in commands {
                    params.push(entry.id);
                    // little endian, high bytes past u32 are zero
                    for byte in 0..u32::from(*data_len) {
                        let shifted = entry.value.checked_shr(8 * byte).unwrap_or(0);
                        params.push(shifted as u8);
                    }
                }
                params
            }
        }
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Frame::new(self.id(), self.opcode().into(), self.params())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.to_frame()?.encode())
    }
}
