//! Conversion between the wire format of the peripheral and typed values.
//!
//! Outgoing: an 81 symbol LED pattern becomes a 13 byte [`DisplayFrame`].
//! Incoming: a raw notification payload of a [`SensorChannel`] becomes a [`SensorEvent`].

use std::time::Duration;

use crate::device::constants::{DISPLAY_FRAME_LEN, LED_COUNT, ROW_BYTES};
use crate::device::types::{ButtonAction, FlyDirection, SensorChannel, SensorEvent, SwipeDirection};
use crate::error::FormatError;

const BRIGHTNESS_INDEX: usize = 11;
const TIMEOUT_INDEX: usize = 12;

/// The command written to the LED matrix characteristic.
///
/// Layout: 10 row bytes where bit `j` of byte `i` is LED `i * 8 + j`, then bit 0 of byte 10
/// for LED 80, then brightness, then the timeout in tenths of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFrame([u8; DISPLAY_FRAME_LEN]);

impl DisplayFrame {
    pub fn from_bytes(bytes: [u8; DISPLAY_FRAME_LEN]) -> Self {
        DisplayFrame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DISPLAY_FRAME_LEN] {
        &self.0
    }

    pub fn brightness(&self) -> u8 {
        self.0[BRIGHTNESS_INDEX]
    }

    pub fn timeout(&self) -> u8 {
        self.0[TIMEOUT_INDEX]
    }

    pub fn is_lit(&self, led: usize) -> bool {
        if led >= LED_COUNT {
            return false;
        }

        self.0[led / 8] & (1 << (led % 8)) != 0
    }

    /// Renders the LEDs back to a pattern: `'*'` for lit, `' '` for dark.
    pub fn to_pattern(&self) -> String {
        (0..LED_COUNT)
            .map(|led| if self.is_lit(led) { '*' } else { ' ' })
            .collect()
    }
}

fn is_lit_symbol(symbol: char) -> bool {
    symbol != ' ' && symbol != '0'
}

pub fn encode_display(pattern: &str, brightness: u8, timeout: u8) -> Result<DisplayFrame, FormatError> {
    let symbols: Vec<char> = pattern.chars().collect();
    if symbols.len() != LED_COUNT {
        return Err(FormatError::WrongLength { actual: symbols.len() });
    }

    let mut data = [0u8; DISPLAY_FRAME_LEN];
    for (led, symbol) in symbols.into_iter().enumerate() {
        if is_lit_symbol(symbol) {
            // LED 80 lands in bit 0 of byte 10, same as the rows
            data[led / 8] |= 1 << (led % 8);
        }
    }

    debug_assert!(data[ROW_BYTES] <= 1);
    data[BRIGHTNESS_INDEX] = brightness;
    data[TIMEOUT_INDEX] = timeout;

    Ok(DisplayFrame(data))
}

/// Converts a display duration to the timeout byte (tenths of a second), saturating at 25.5s.
pub fn timeout_from_duration(duration: Duration) -> u8 {
    let tenths = duration.as_millis() / 100;
    u8::try_from(tenths).unwrap_or(u8::MAX)
}

fn require(channel: SensorChannel, payload: &[u8], expected: usize) -> Result<(), FormatError> {
    if payload.len() < expected {
        return Err(FormatError::Truncated { channel, expected, actual: payload.len() });
    }
    Ok(())
}

fn unknown(channel: SensorChannel, value: u8) -> FormatError {
    FormatError::UnknownCode { channel, value }
}

/// Battery percentage from a read or notification of the battery characteristic.
pub fn decode_battery_level(payload: &[u8]) -> Result<u8, FormatError> {
    require(SensorChannel::Battery, payload, 1)?;

    let level = payload[0];
    if level > 100 {
        return Err(FormatError::BatteryOutOfRange(level));
    }
    Ok(level)
}

pub fn decode_event(channel: SensorChannel, payload: &[u8]) -> Result<SensorEvent, FormatError> {
    match channel {
        SensorChannel::Battery => decode_battery_level(payload).map(SensorEvent::Battery),
        SensorChannel::Button => {
            require(channel, payload, 1)?;
            ButtonAction::from_code(payload[0])
                .map(SensorEvent::Button)
                .ok_or_else(|| unknown(channel, payload[0]))
        },
        SensorChannel::Rotation => {
            require(channel, payload, 2)?;
            if payload.len() != 2 {
                return Err(FormatError::UnexpectedLength { channel, expected: 2, actual: payload.len() });
            }
            Ok(SensorEvent::Rotation(i16::from_le_bytes([payload[0], payload[1]])))
        },
        SensorChannel::Swipe => {
            require(channel, payload, 1)?;
            SwipeDirection::from_code(payload[0])
                .map(SensorEvent::Swipe)
                .ok_or_else(|| unknown(channel, payload[0]))
        },
        SensorChannel::Fly => {
            require(channel, payload, 2)?;
            let direction = FlyDirection::from_code(payload[0])
                .ok_or_else(|| unknown(channel, payload[0]))?;
            Ok(SensorEvent::Fly { direction, distance: payload[1] })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::{DEFAULT_BRIGHTNESS, DEFAULT_TIMEOUT};

    const CHECKERBOARD: &str = concat!(
        "* * * * *",
        " * * * * ",
        "* * * * *",
        " * * * * ",
        "* * * * *",
        " * * * * ",
        "* * * * *",
        " * * * * ",
        "* * * * *",
    );

    #[test]
    fn test_dark_pattern_clears_led_bytes() {
        let pattern: String = (0..81).map(|i| if i % 2 == 0 { '0' } else { ' ' }).collect();
        let frame = encode_display(&pattern, DEFAULT_BRIGHTNESS, DEFAULT_TIMEOUT).unwrap();

        assert_eq!(&frame.as_bytes()[..11], &[0u8; 11]);
        assert_eq!(frame.brightness(), 255);
        assert_eq!(frame.timeout(), 20);
    }

    #[test]
    fn test_fully_lit_pattern() {
        let pattern = "*".repeat(81);
        let frame = encode_display(&pattern, 1, 2).unwrap();

        assert_eq!(&frame.as_bytes()[..10], &[0xFF; 10]);
        assert_eq!(frame.as_bytes()[10], 0x01);
    }

    #[test]
    fn test_any_non_blank_symbol_is_lit() {
        let mut pattern = " ".repeat(80);
        pattern.push('x');
        let frame = encode_display(&pattern, 0, 0).unwrap();
        assert_eq!(frame.as_bytes(), &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0]);

        let pattern = format!("1{}", " ".repeat(80));
        let frame = encode_display(&pattern, 0, 0).unwrap();
        assert_eq!(frame.as_bytes()[0], 0x01);
    }

    #[test]
    fn test_bit_order_within_row_byte() {
        // LED 7 is the most significant bit of the first byte, LED 8 the least of the second
        let pattern: String = (0..81).map(|i| if i == 7 || i == 8 { '*' } else { ' ' }).collect();
        let frame = encode_display(&pattern, 0, 0).unwrap();

        assert_eq!(frame.as_bytes()[0], 0x80);
        assert_eq!(frame.as_bytes()[1], 0x01);
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            encode_display(&"*".repeat(80), 255, 20),
            Err(FormatError::WrongLength { actual: 80 }),
        );
        assert_eq!(
            encode_display(&"*".repeat(82), 255, 20),
            Err(FormatError::WrongLength { actual: 82 }),
        );
    }

    #[test]
    fn test_length_counts_symbols_not_bytes() {
        let pattern = "é".repeat(81);
        let frame = encode_display(&pattern, 0, 0).unwrap();
        assert_eq!(&frame.as_bytes()[..10], &[0xFF; 10]);
    }

    #[test]
    fn test_brightness_and_timeout_are_copied() {
        for value in [0u8, 1, 20, 127, 128, 254, 255] {
            let frame = encode_display(CHECKERBOARD, value, 255 - value).unwrap();
            assert_eq!(frame.as_bytes()[11], value);
            assert_eq!(frame.as_bytes()[12], 255 - value);
        }
    }

    #[test]
    fn test_pattern_survives_frame() {
        let frame = encode_display(CHECKERBOARD, 255, 20).unwrap();
        assert_eq!(frame.to_pattern(), CHECKERBOARD);

        let copy = DisplayFrame::from_bytes(*frame.as_bytes());
        assert_eq!(copy, frame);
        assert!(copy.is_lit(0));
        assert!(!copy.is_lit(1));
        assert!(!copy.is_lit(81));
    }

    #[test]
    fn test_timeout_from_duration() {
        assert_eq!(timeout_from_duration(Duration::from_secs(2)), 20);
        assert_eq!(timeout_from_duration(Duration::from_millis(2250)), 22);
        assert_eq!(timeout_from_duration(Duration::from_secs(60)), 255);
        assert_eq!(timeout_from_duration(Duration::ZERO), 0);
    }

    #[test]
    fn test_decode_rotation() {
        assert_eq!(decode_event(SensorChannel::Rotation, &[0x01, 0x00]), Ok(SensorEvent::Rotation(1)));
        assert_eq!(decode_event(SensorChannel::Rotation, &[0xFF, 0xFF]), Ok(SensorEvent::Rotation(-1)));
        assert_eq!(decode_event(SensorChannel::Rotation, &[0x00, 0x80]), Ok(SensorEvent::Rotation(i16::MIN)));
        assert_eq!(
            decode_event(SensorChannel::Rotation, &[0x01, 0x00, 0x00]),
            Err(FormatError::UnexpectedLength { channel: SensorChannel::Rotation, expected: 2, actual: 3 }),
        );
    }

    #[test]
    fn test_decode_battery() {
        assert_eq!(decode_event(SensorChannel::Battery, &[42]), Ok(SensorEvent::Battery(42)));
        assert_eq!(decode_event(SensorChannel::Battery, &[100, 7]), Ok(SensorEvent::Battery(100)));
        assert_eq!(decode_event(SensorChannel::Battery, &[101]), Err(FormatError::BatteryOutOfRange(101)));
    }

    #[test]
    fn test_decode_button_swipe_fly() {
        assert_eq!(decode_event(SensorChannel::Button, &[1]), Ok(SensorEvent::Button(ButtonAction::Pressed)));
        assert_eq!(decode_event(SensorChannel::Button, &[0]), Ok(SensorEvent::Button(ButtonAction::Released)));
        assert_eq!(decode_event(SensorChannel::Swipe, &[3]), Ok(SensorEvent::Swipe(SwipeDirection::Down)));
        assert_eq!(
            decode_event(SensorChannel::Fly, &[4, 120]),
            Ok(SensorEvent::Fly { direction: FlyDirection::UpDown, distance: 120 }),
        );
    }

    #[test]
    fn test_unknown_codes_are_rejected() {
        assert_eq!(
            decode_event(SensorChannel::Button, &[2]),
            Err(FormatError::UnknownCode { channel: SensorChannel::Button, value: 2 }),
        );
        assert_eq!(
            decode_event(SensorChannel::Swipe, &[9]),
            Err(FormatError::UnknownCode { channel: SensorChannel::Swipe, value: 9 }),
        );
        assert_eq!(
            decode_event(SensorChannel::Fly, &[5, 0]),
            Err(FormatError::UnknownCode { channel: SensorChannel::Fly, value: 5 }),
        );
    }

    #[test]
    fn test_short_payloads_are_truncated() {
        let cases: [(SensorChannel, &[u8]); 5] = [
            (SensorChannel::Battery, &[]),
            (SensorChannel::Button, &[]),
            (SensorChannel::Rotation, &[0x01]),
            (SensorChannel::Swipe, &[]),
            (SensorChannel::Fly, &[4]),
        ];

        for (channel, payload) in cases {
            match decode_event(channel, payload) {
                Err(FormatError::Truncated { channel: reported, actual, .. }) => {
                    assert_eq!(reported, channel);
                    assert_eq!(actual, payload.len());
                },
                other => panic!("expected truncation for {}, got {:?}", channel, other),
            }
        }
    }
}
