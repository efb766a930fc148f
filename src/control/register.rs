//! Register access sub-mode of the pause console.
//!
//! Reads and writes named register fields directly. Input `c` leaves the
//! mode at any prompt.

use super::console::{Console, parse_bool, parse_int};
use crate::defaults::{MAC_BOTH_CHANNELS, MAC_REGISTER};
use crate::device::{DeviceEndpoint, RegisterParam};
use crate::output;
use crate::session::Link;

const MODE_PROMPT: &str = "paused=>SPI=>rd(0)/wr(1)/help(2)/find(3)=>";

/// Run register mode until `c` or end of input.
pub fn run(console: &mut Console, link: &Link<'_>) {
    console.say("Entering SPI Mode, careful from now on. Write \"c\" to quit at all time.");

    loop {
        let Some(token) = console.ask_token(MODE_PROMPT) else {
            return;
        };
        let mut chars = token.chars();
        match chars.next() {
            Some('c') => return,
            Some('2') => list(console, link.tx, None),
            Some('3') => {
                let inline = chars.as_str();
                let needle = if inline.is_empty() {
                    console.pending_text()
                } else {
                    Some(inline.to_string())
                };
                match needle {
                    Some(needle) => list(console, link.tx, Some(&needle)),
                    None => console.say("Find: write 3 and afterwards the text you want to find."),
                }
            }
            Some('0') => {
                if read(console, link).is_none() {
                    return;
                }
            }
            Some('1') => {
                if write(console, link).is_none() {
                    return;
                }
            }
            _ => {}
        }
        console.discard_pending();
    }
}

fn list(console: &mut Console, endpoint: &dyn DeviceEndpoint, needle: Option<&str>) {
    for param in endpoint.register_params() {
        let line = param.listing();
        if needle.is_none_or(|needle| line.contains(needle)) {
            console.say(line);
        }
    }
}

/// Ask for a parameter name and, with distinct endpoints, which one to use.
///
/// `Some(None)` means the operator backed out with `c`. `None` means input closed.
fn select<'a>(
    console: &mut Console,
    link: &Link<'a>,
    action: &str,
) -> Option<Option<(String, &'a dyn DeviceEndpoint)>> {
    let name = console.ask_token(&format!("paused=>SPI=>{action}=>Name=>"))?;
    if name.starts_with('c') {
        return Some(None);
    }
    let endpoint = if link.distinct() {
        let answer = console.ask_token(&format!("paused=>SPI=>{action}=>rx(0)/tx(1)=>"))?;
        if parse_bool(&answer) { link.tx } else { link.rx }
    } else {
        link.rx
    };
    Some(Some((name, endpoint)))
}

/// Exact name first, then the first field whose name the input contains.
fn find_param(endpoint: &dyn DeviceEndpoint, name: &str) -> Option<RegisterParam> {
    let params = endpoint.register_params();
    let exact = params
        .iter()
        .position(|param| param.name.eq_ignore_ascii_case(name));
    match exact {
        Some(index) => params.into_iter().nth(index),
        None => params
            .into_iter()
            .find(|param| name.contains(param.name.as_str())),
    }
}

fn read(console: &mut Console, link: &Link<'_>) -> Option<()> {
    let Some((name, endpoint)) = select(console, link, "rd")? else {
        return Some(());
    };

    match endpoint.read_register(MAC_REGISTER) {
        Ok(MAC_BOTH_CHANNELS) => {
            console.say("Failed: MAC register is set to 3, read would corrupt data.");
            return Some(());
        }
        Ok(_) => {}
        Err(e) => {
            console.say(format!("Failed: {e}"));
            return Some(());
        }
    }

    let Some(param) = find_param(endpoint, &name) else {
        console.say(format!("Unknown parameter {name}"));
        return Some(());
    };
    match endpoint.read_register(&param.name) {
        Ok(value) => console.say(output::register_value(&param, value)),
        Err(e) => console.say(format!("Failed: {e}")),
    }
    Some(())
}

fn write(console: &mut Console, link: &Link<'_>) -> Option<()> {
    let Some((name, endpoint)) = select(console, link, "wr")? else {
        return Some(());
    };
    let Some(param) = find_param(endpoint, &name) else {
        console.say(format!("Unknown parameter {name}"));
        return Some(());
    };

    match endpoint.read_register(&param.name) {
        Ok(value) => console.say(output::register_value(&param, value)),
        Err(e) => {
            console.say(format!("Failed: {e}"));
            return Some(());
        }
    }

    let answer = console.ask_token("paused=>SPI=>wr=>Value=>")?;
    if answer.starts_with('c') {
        return Some(());
    }
    let written = u16::try_from(parse_int(&answer))
        .ok()
        .and_then(|value| endpoint.write_register(&param.name, value).ok())
        .and_then(|()| endpoint.read_register(&param.name).ok());
    match written {
        Some(value) => console.say(output::register_value(&param, value)),
        None => console.say("Failed"),
    }
    Some(())
}
