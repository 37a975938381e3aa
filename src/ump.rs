//! Universal MIDI Packet helpers for the native transport
//!
//! Converts between MIDI 1.0 byte messages (what host applications speak on
//! the virtual device) and UMP words (what travels in a Network MIDI 2.0
//! session). Only short messages are handled; SysEx is not transcoded.
//! Packets are built and parsed with the `midi2` message types; the word
//! size table and the stream filter cover what the session loop needs
//! before a packet is handed to them.

use midi2::channel_voice1 as cv1;
use midi2::channel_voice2 as cv2;
use midi2::prelude::*;
use midi2::system_common as sc;

/// Words per packet, indexed by UMP message type (top nibble of word 0)
const UMP_WORDS: [usize; 16] = [1, 1, 1, 2, 2, 4, 1, 1, 2, 2, 2, 3, 3, 4, 4, 4];

/// UMP message types used here
pub mod message_type {
    pub const UTILITY: u8 = 0x0;
    pub const SYSTEM: u8 = 0x1;
    pub const MIDI1_CHANNEL_VOICE: u8 = 0x2;
    pub const MIDI2_CHANNEL_VOICE: u8 = 0x4;
    pub const STREAM: u8 = 0xF;
}

/// Message type nibble of a UMP's first word
pub fn message_type(first_word: u32) -> u8 {
    (first_word >> 28) as u8
}

/// Number of 32-bit words in the packet starting with `first_word`
pub fn ump_word_count(first_word: u32) -> usize {
    UMP_WORDS[(first_word >> 28) as usize]
}

/// UMP stream messages (endpoint discovery, names, ...) are session
/// plumbing and are never delivered to the host application
pub fn is_stream_message(first_word: u32) -> bool {
    message_type(first_word) == message_type::STREAM
}

/// Length in bytes of a MIDI 1.0 message with the given status byte
///
/// Returns `None` for data bytes, SysEx framing and undefined statuses.
pub fn midi1_message_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Some(3),
        0xC0..=0xDF => Some(2),
        0xF1 | 0xF3 => Some(2),
        0xF2 => Some(3),
        0xF6 | 0xF8..=0xFF => Some(1),
        _ => None,
    }
}

/// Transcode one MIDI 1.0 message into a single-word UMP
///
/// Channel voice messages become message type 0x2, system common and
/// real-time messages type 0x1. Running status is not supported.
pub fn midi1_to_ump(bytes: &[u8], group: u8) -> Option<u32> {
    let status = *bytes.first()?;
    let len = midi1_message_len(status)?;
    if bytes.len() < len {
        return None;
    }

    let group = u4::new(group & 0x0F);
    let channel = u4::new(status & 0x0F);
    let data1 = u7::new(bytes.get(1).map_or(0, |b| b & 0x7F));
    let data2 = u7::new(bytes.get(2).map_or(0, |b| b & 0x7F));

    match status & 0xF0 {
        0x80 => {
            let mut msg = cv1::NoteOff::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_note_number(data1);
            msg.set_velocity(data2);
            first_word(msg.data())
        },
        0x90 => {
            let mut msg = cv1::NoteOn::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_note_number(data1);
            msg.set_velocity(data2);
            first_word(msg.data())
        },
        0xA0 => {
            let mut msg = cv1::KeyPressure::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_note_number(data1);
            msg.set_pressure(data2);
            first_word(msg.data())
        },
        0xB0 => {
            let mut msg = cv1::ControlChange::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_control(data1);
            msg.set_control_data(data2);
            first_word(msg.data())
        },
        0xC0 => {
            let mut msg = cv1::ProgramChange::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_program(data1);
            first_word(msg.data())
        },
        0xD0 => {
            let mut msg = cv1::ChannelPressure::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_pressure(data1);
            first_word(msg.data())
        },
        0xE0 => {
            let mut msg = cv1::PitchBend::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_channel(channel);
            msg.set_bend(fourteen_bit(data1, data2));
            first_word(msg.data())
        },
        _ => system_to_ump(status, data1, data2, group),
    }
}

fn system_to_ump(status: u8, data1: u7, data2: u7, group: u4) -> Option<u32> {
    macro_rules! bare {
        ($kind:ident) => {{
            let mut msg = sc::$kind::<[u32; 4]>::new();
            msg.set_group(group);
            first_word(msg.data())
        }};
    }

    match status {
        0xF1 => {
            let mut msg = sc::TimeCode::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_time_code(data1);
            first_word(msg.data())
        },
        0xF2 => {
            let mut msg = sc::SongPositionPointer::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_position(fourteen_bit(data1, data2));
            first_word(msg.data())
        },
        0xF3 => {
            let mut msg = sc::SongSelect::<[u32; 4]>::new();
            msg.set_group(group);
            msg.set_song(data1);
            first_word(msg.data())
        },
        0xF6 => bare!(TuneRequest),
        0xF8 => bare!(TimingClock),
        0xFA => bare!(Start),
        0xFB => bare!(Continue),
        0xFC => bare!(Stop),
        0xFE => bare!(ActiveSensing),
        0xFF => bare!(Reset),
        _ => None,
    }
}

fn first_word(data: &[u32]) -> Option<u32> {
    data.first().copied()
}

fn fourteen_bit(lsb: u7, msb: u7) -> u14 {
    u14::new((u16::from(u8::from(msb)) << 7) | u16::from(u8::from(lsb)))
}

/// Convert a UMP into MIDI 1.0 bytes written to `out`
///
/// Handles system (0x1), MIDI 1.0 channel voice (0x2) and MIDI 2.0 channel
/// voice (0x4, scaled down to 7/14 bits). Returns the number of bytes
/// written, 0 when the packet has no MIDI 1.0 equivalent.
pub fn ump_to_midi1(words: &[u32], out: &mut [u8; 3]) -> usize {
    let Some(&w0) = words.first() else {
        return 0;
    };
    let size = ump_word_count(w0);
    if words.len() < size {
        return 0;
    }

    match message_type(w0) {
        // The MIDI 1.0 bytes travel verbatim in the low three octets
        message_type::SYSTEM | message_type::MIDI1_CHANNEL_VOICE => {
            let [_, status, byte1, byte2] = w0.to_be_bytes();
            let Some(len) = midi1_message_len(status) else {
                return 0;
            };
            out[0] = status;
            out[1] = byte1 & 0x7F;
            out[2] = byte2 & 0x7F;
            len
        },
        message_type::MIDI2_CHANNEL_VOICE => match cv2::ChannelVoice2::try_from(&words[..size]) {
            Ok(msg) => midi2_to_midi1(&msg, ((w0 >> 16) & 0x0F) as u8, out),
            Err(_) => 0,
        },
        _ => 0,
    }
}

fn midi2_to_midi1(msg: &cv2::ChannelVoice2<&[u32]>, channel: u8, out: &mut [u8; 3]) -> usize {
    match msg {
        cv2::ChannelVoice2::NoteOff(m) => {
            out[0] = 0x80 | channel;
            out[1] = u8::from(m.note_number());
            out[2] = (m.velocity() >> 9) as u8;
            3
        },
        cv2::ChannelVoice2::NoteOn(m) => {
            out[0] = 0x90 | channel;
            out[1] = u8::from(m.note_number());
            // Velocity 0 would turn a MIDI 2.0 note-on into a note-off
            out[2] = ((m.velocity() >> 9) as u8).max(1);
            3
        },
        cv2::ChannelVoice2::KeyPressure(m) => {
            out[0] = 0xA0 | channel;
            out[1] = u8::from(m.note_number());
            out[2] = (m.key_pressure_data() >> 25) as u8;
            3
        },
        cv2::ChannelVoice2::ControlChange(m) => {
            out[0] = 0xB0 | channel;
            out[1] = u8::from(m.control());
            out[2] = (m.control_change_data() >> 25) as u8;
            3
        },
        cv2::ChannelVoice2::ProgramChange(m) => {
            out[0] = 0xC0 | channel;
            out[1] = u8::from(m.program());
            2
        },
        cv2::ChannelVoice2::ChannelPressure(m) => {
            out[0] = 0xD0 | channel;
            out[1] = (m.channel_pressure_data() >> 25) as u8;
            2
        },
        cv2::ChannelVoice2::ChannelPitchBend(m) => {
            let bend = m.pitch_bend_data() >> 18;
            out[0] = 0xE0 | channel;
            out[1] = (bend & 0x7F) as u8;
            out[2] = ((bend >> 7) & 0x7F) as u8;
            3
        },
        // Per-note and registered controllers have no MIDI 1.0 form
        _ => 0,
    }
}
