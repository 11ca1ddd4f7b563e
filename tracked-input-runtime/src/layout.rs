//! Mapping between the host's movement command struct and [`MovementCommand`].
//!
//! Host builds differ in what precedes the command fields (a vtable pointer on
//! the older 32-bit client), so every logical field is located through a
//! per-build table that is validated once at startup.

use std::mem::{offset_of, size_of};

use bytemuck::Zeroable;
use serde::{Deserialize, Serialize};

use crate::error::{TrackedInputError, TrackedInputResult};
use crate::types::MovementCommand;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostBuild {
    /// Fields start at offset 0, identical to [`MovementCommand`].
    #[default]
    Native,
    /// 32-bit client with a vtable pointer ahead of the fields.
    LegacyVtable32,
}

impl HostBuild {
    fn prefix(self) -> usize {
        match self {
            HostBuild::Native => 0,
            HostBuild::LegacyVtable32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandField {
    SequenceNumber,
    TickSignal,
    ViewAngles,
    ForwardMove,
    SideMove,
    VerticalMove,
    Buttons,
    Impulse,
    WeaponSelect,
    WeaponSubtype,
    RandomSeed,
    MouseDx,
    MouseDy,
    HasBeenPredicted,
    Checksum,
}

impl CommandField {
    pub const ALL: [CommandField; 15] = [
        CommandField::SequenceNumber,
        CommandField::TickSignal,
        CommandField::ViewAngles,
        CommandField::ForwardMove,
        CommandField::SideMove,
        CommandField::VerticalMove,
        CommandField::Buttons,
        CommandField::Impulse,
        CommandField::WeaponSelect,
        CommandField::WeaponSubtype,
        CommandField::RandomSeed,
        CommandField::MouseDx,
        CommandField::MouseDy,
        CommandField::HasBeenPredicted,
        CommandField::Checksum,
    ];

    /// Offset inside [`MovementCommand`].
    fn native_offset(self) -> usize {
        match self {
            CommandField::SequenceNumber => offset_of!(MovementCommand, sequence_number),
            CommandField::TickSignal => offset_of!(MovementCommand, tick_signal),
            CommandField::ViewAngles => offset_of!(MovementCommand, view_angles),
            CommandField::ForwardMove => offset_of!(MovementCommand, forward_move),
            CommandField::SideMove => offset_of!(MovementCommand, side_move),
            CommandField::VerticalMove => offset_of!(MovementCommand, vertical_move),
            CommandField::Buttons => offset_of!(MovementCommand, buttons),
            CommandField::Impulse => offset_of!(MovementCommand, impulse),
            CommandField::WeaponSelect => offset_of!(MovementCommand, weapon_select),
            CommandField::WeaponSubtype => offset_of!(MovementCommand, weapon_subtype),
            CommandField::RandomSeed => offset_of!(MovementCommand, random_seed),
            CommandField::MouseDx => offset_of!(MovementCommand, mouse_dx),
            CommandField::MouseDy => offset_of!(MovementCommand, mouse_dy),
            CommandField::HasBeenPredicted => offset_of!(MovementCommand, has_been_predicted),
            CommandField::Checksum => offset_of!(MovementCommand, checksum),
        }
    }

    pub fn size(self) -> usize {
        match self {
            CommandField::ViewAngles => 12,
            CommandField::Impulse | CommandField::HasBeenPredicted => 1,
            CommandField::MouseDx | CommandField::MouseDy => 2,
            _ => 4,
        }
    }

    fn align(self) -> usize {
        match self {
            CommandField::ViewAngles => 4,
            other => other.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLayout {
    pub build: HostBuild,
    pub size: usize,
    offsets: [(CommandField, usize); 15],
}

impl CommandLayout {
    pub fn for_build(build: HostBuild) -> Self {
        let prefix = build.prefix();
        Self {
            build,
            size: prefix + size_of::<MovementCommand>(),
            offsets: CommandField::ALL.map(|field| (field, prefix + field.native_offset())),
        }
    }

    pub fn offset(&self, field: CommandField) -> usize {
        self.offsets
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .map(|(_, offset)| *offset)
            .unwrap_or_default()
    }

    /// Checks the table against the size the host reports for its struct.
    pub fn validate(&self, host_size: usize) -> TrackedInputResult<()> {
        if host_size != self.size {
            return Err(TrackedInputError::LayoutMismatch(format!(
                "host command is {} bytes, {:?} expects {}",
                host_size, self.build, self.size
            )));
        }

        let mut spans: Vec<(usize, usize, CommandField)> = self
            .offsets
            .iter()
            .map(|&(field, offset)| (offset, offset + field.size(), field))
            .collect();
        spans.sort_by_key(|&(start, _, _)| start);

        for &(start, end, field) in &spans {
            if end > self.size {
                return Err(TrackedInputError::LayoutMismatch(format!(
                    "{:?} at {}..{} runs past the {} byte struct",
                    field, start, end, self.size
                )));
            }
            if start % field.align() != 0 {
                return Err(TrackedInputError::LayoutMismatch(format!(
                    "{:?} at offset {} is misaligned",
                    field, start
                )));
            }
        }

        for pair in spans.windows(2) {
            let (_, end, field) = pair[0];
            let (next_start, _, next_field) = pair[1];
            if end > next_start {
                return Err(TrackedInputError::LayoutMismatch(format!(
                    "{:?} overlaps {:?}",
                    field, next_field
                )));
            }
        }

        Ok(())
    }

    /// Copies each field out of the host's bytes.
    pub fn read(&self, bytes: &[u8]) -> TrackedInputResult<MovementCommand> {
        self.check_len(bytes.len())?;
        let mut cmd = MovementCommand::zeroed();
        let dst = bytemuck::bytes_of_mut(&mut cmd);
        for &(field, offset) in &self.offsets {
            let native = field.native_offset();
            dst[native..native + field.size()].copy_from_slice(&bytes[offset..offset + field.size()]);
        }
        Ok(cmd)
    }

    /// Writes each field back into the host's bytes, leaving everything else
    /// (vtable, padding) untouched.
    pub fn write(&self, cmd: &MovementCommand, bytes: &mut [u8]) -> TrackedInputResult<()> {
        self.check_len(bytes.len())?;
        let src = bytemuck::bytes_of(cmd);
        for &(field, offset) in &self.offsets {
            let native = field.native_offset();
            bytes[offset..offset + field.size()].copy_from_slice(&src[native..native + field.size()]);
        }
        Ok(())
    }

    fn check_len(&self, len: usize) -> TrackedInputResult<()> {
        if len < self.size {
            return Err(TrackedInputError::LayoutMismatch(format!(
                "buffer of {} bytes is smaller than the {} byte command",
                len, self.size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MovementCommand {
        let mut cmd = MovementCommand {
            sequence_number: 99,
            tick_signal: -1234,
            view_angles: [1.5, -2.5, 3.5],
            forward_move: 200.0,
            side_move: -100.0,
            vertical_move: 7.0,
            buttons: 0x41,
            impulse: 101,
            weapon_select: 2,
            weapon_subtype: 1,
            random_seed: 31337,
            mouse_dx: -17,
            mouse_dy: 23,
            has_been_predicted: 1,
            ..Default::default()
        };
        cmd.refresh_checksum();
        cmd
    }

    #[test]
    fn native_layout_is_byte_for_byte() {
        let layout = CommandLayout::for_build(HostBuild::Native);
        layout.validate(64).unwrap();

        let cmd = sample();
        let mut bytes = [0u8; 64];
        layout.write(&cmd, &mut bytes).unwrap();
        assert_eq!(&bytes[..], bytemuck::bytes_of(&cmd));
        assert_eq!(&bytes[0..4], &99i32.to_ne_bytes());
        assert_eq!(&bytes[52..54], &(-17i16).to_ne_bytes());
        assert_eq!(&bytes[60..64], &cmd.checksum.to_ne_bytes());
        assert_eq!(layout.read(&bytes).unwrap(), cmd);
    }

    #[test]
    fn vtable_prefix_is_preserved() {
        let layout = CommandLayout::for_build(HostBuild::LegacyVtable32);
        layout.validate(68).unwrap();
        assert_eq!(layout.offset(CommandField::TickSignal), 8);

        let mut bytes = [0xAAu8; 68];
        layout.write(&sample(), &mut bytes).unwrap();
        assert_eq!(&bytes[0..4], &[0xAA; 4]);
        assert_eq!(layout.read(&bytes).unwrap(), sample());
    }

    #[test]
    fn wrong_host_size_fails_fast() {
        let layout = CommandLayout::for_build(HostBuild::Native);
        let err = layout.validate(68).unwrap_err();
        assert!(matches!(err, TrackedInputError::LayoutMismatch(_)));
        assert!(layout.read(&[0u8; 10]).is_err());
    }
}
