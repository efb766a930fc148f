//! Text rendering for the pause console: status tables, buffer listings and
//! endpoint parameter lines.

use crate::buffer::SymbolBuffer;
use crate::control::COMMANDS;
use crate::device::{RegisterParam, StreamStatus};

/// Two-column table comparing the TX and RX stream of one channel.
pub fn status_table(channel: usize, tx: &StreamStatus, rx: &StreamStatus) -> String {
    let row = |label: &str, tx: String, rx: String| format!("{label:<19}{tx:>10} | {rx:>10}\n");
    let mut table = format!("Channel: {channel:<18}TX | {:>10}\n", "RX");
    table.push_str(&row("Active:", flag(tx.active), flag(rx.active)));
    table.push_str(&row(
        "Dropped Packets:",
        tx.dropped_packets.to_string(),
        rx.dropped_packets.to_string(),
    ));
    table.push_str(&row(
        "FIFO Filled Count:",
        tx.fifo_filled_count.to_string(),
        rx.fifo_filled_count.to_string(),
    ));
    table.push_str(&row(
        "FIFO Size:",
        tx.fifo_size.to_string(),
        rx.fifo_size.to_string(),
    ));
    table.push_str(&row(
        "Link Rate:",
        format!("{:.6}", tx.link_rate),
        format!("{:.6}", rx.link_rate),
    ));
    table.push_str(&row(
        "Overruns:",
        tx.overrun.to_string(),
        rx.overrun.to_string(),
    ));
    table.push_str(&format!("{:<19}{:>10}\n", "Timestamp:", rx.timestamp));
    table.push_str(&row(
        "Underruns:",
        tx.underrun.to_string(),
        rx.underrun.to_string(),
    ));
    table
}

fn flag(value: bool) -> String {
    u8::from(value).to_string()
}

/// First `size` symbols of a buffer in two columns: `i` beside `i + size/2`.
///
/// An odd count puts the last symbol on its own line.
pub fn buffer_listing(buffer: &SymbolBuffer, size: usize) -> String {
    let size = size.min(buffer.filled());
    let half = size / 2;
    let mut listing = String::new();
    for i in 0..half {
        let (Some(left), Some(right)) = (buffer.get(i), buffer.get(i + half)) else {
            break;
        };
        listing.push_str(&format!(
            "{i:6}: {:6} - {:6}  |  {:6}: {:6} - {:6}\n",
            left.i,
            left.q,
            i + half,
            right.i,
            right.q
        ));
    }
    if size % 2 == 1
        && let Some(last) = buffer.get(size - 1)
    {
        listing.push_str(&format!("{:6}: {:6} - {:6}\n", size - 1, last.i, last.q));
    }
    listing
}

/// `RX[0]: 5.000 MHz` style line.
pub fn channel_value(direction: &str, channel: usize, value: impl std::fmt::Display) -> String {
    format!("{direction}[{channel}]: {value}")
}

/// Hz rendered as MHz with three decimals.
pub fn mhz(hz: f64) -> String {
    format!("{:.3} MHz", hz / 1e6)
}

/// `NAME(0xADDR): 0xVV/VV` after a register read or write.
pub fn register_value(param: &RegisterParam, value: u16) -> String {
    format!("{}(0x{:04x}): 0x{value:02x}/{value}", param.name, param.address)
}

/// Command list for `help`.
pub fn command_help() -> String {
    let mut help = String::from("Commands (code or name, parameters may follow on the same line):\n");
    for (code, name, summary) in COMMANDS {
        help.push_str(&format!("  {code:>3}  {name:<12} {summary}\n"));
    }
    help
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::Iq;

    #[test]
    fn status_table_layout() {
        let tx = StreamStatus {
            active: true,
            fifo_size: 2048,
            link_rate: 4000000.0,
            ..StreamStatus::default()
        };
        let rx = StreamStatus {
            underrun: 3,
            timestamp: 640,
            ..StreamStatus::default()
        };
        let table = status_table(1, &tx, &rx);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "Channel: 1                 TX |         RX");
        assert_eq!(lines[1], "Active:                     1 |          0");
        assert_eq!(lines[4], "FIFO Size:               2048 |          0");
        assert_eq!(lines[5], "Link Rate:         4000000.000000 |   0.000000");
        assert_eq!(lines[7], "Timestamp:                640");
        assert_eq!(lines[8], "Underruns:                  0 |          3");
    }

    #[test]
    fn listing_pairs_halves() {
        let mut buffer = SymbolBuffer::new(8);
        for i in 0..5 {
            buffer.set(i, Iq::new(i as i16, -(i as i16)));
        }
        buffer.set_filled(5);
        let listing = buffer_listing(&buffer, 5);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "     0:      0 -      0  |       2:      2 -     -2");
        assert_eq!(lines[2], "     4:      4 -     -4");
    }

    #[test]
    fn listing_is_bounded_by_filled() {
        let mut buffer = SymbolBuffer::new(8);
        buffer.set_filled(2);
        assert_eq!(buffer_listing(&buffer, 100).lines().count(), 1);
    }

    #[test]
    fn register_value_format() {
        let param = RegisterParam {
            name: "MAC".to_string(),
            address: 0x0020,
            msb: 1,
            lsb: 0,
            default_value: 1,
            tooltip: String::new(),
        };
        assert_eq!(register_value(&param, 3), "MAC(0x0020): 0x03/3");
    }

    #[test]
    fn help_lists_every_command() {
        let help = command_help();
        assert!(help.contains("  200  spi"));
        assert_eq!(help.lines().count(), COMMANDS.len() + 1);
    }

    #[test]
    fn frequency_rendering() {
        assert_eq!(mhz(2450e6), "2450.000 MHz");
        assert_eq!(channel_value("TX", 1, 40), "TX[1]: 40");
    }
}
