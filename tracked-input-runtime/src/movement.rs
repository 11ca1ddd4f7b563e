use crate::types::MovementCommand;

pub const IN_FORWARD: i32 = 1 << 3;
pub const IN_BACK: i32 = 1 << 4;
pub const IN_MOVELEFT: i32 = 1 << 9;
pub const IN_MOVERIGHT: i32 = 1 << 10;

const AXIS_BUTTONS: i32 = IN_FORWARD | IN_BACK | IN_MOVELEFT | IN_MOVERIGHT;

/// Mirrors thumbstick movement into the button mask for receivers that only
/// read buttons. Runs on the movement path, before the tracked input encode.
pub fn apply_axis_buttons(cmd: &mut MovementCommand, deadzone: f32) {
    let mut buttons = cmd.buttons & !AXIS_BUTTONS;

    if cmd.forward_move > deadzone {
        buttons |= IN_FORWARD;
    } else if cmd.forward_move < -deadzone {
        buttons |= IN_BACK;
    }

    if cmd.side_move > deadzone {
        buttons |= IN_MOVERIGHT;
    } else if cmd.side_move < -deadzone {
        buttons |= IN_MOVELEFT;
    }

    if buttons != cmd.buttons {
        cmd.buttons = buttons;
        cmd.refresh_checksum();
    }
}
