//! Power meter `ERR?` code lookup.

/// Map a power meter error register code to its description.
///
/// Unknown codes map to a generic description rather than failing; the code
/// itself is still surfaced alongside the message.
pub fn describe_meter_error(code: i32) -> &'static str {
    match code {
        0 => "No error",
        -101 => "Invalid character received in command or parameter",
        -103 => "Invalid separator between command and parameter",
        -104 => "Data type error: parameter is not an acceptable data type",
        -108 => "Parameter not allowed: unexpected number of parameters",
        -109 => "Missing parameter: parameter longer than 18 characters",
        -110 => "Command header error: command longer than 13 characters",
        -113 => "Undefined header: unsupported command",
        -221 => "Setting conflict: setup command received while a measurement is running",
        -222 => "Data out of range",
        -284 => "Program currently running: module command pipeline busy",
        -300 => "Device specific error: GPIB address exceeds 32",
        -301 => "Not a measurement module: target slot is not installed",
        -350 => "Queue overflow in internal task communication",
        -351 => "Queue empty in internal task communication",
        101 => "uPP comm. header error between mainframe and module",
        103 => "uPP comm. no response from module",
        104 => "uPP comm. module mismatched",
        110 => "TCP/IP communication error: transfer incomplete",
        116 => "GPIB transfer not completed",
        117 => "GPIB transfer timer expired",
        120 => "Measurement completion trigger not received from module",
        210 => "Unregistered message delivered between internal tasks",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_descriptions() {
        assert_eq!(describe_meter_error(0), "No error");
        assert_eq!(describe_meter_error(-222), "Data out of range");
        assert!(describe_meter_error(-221).starts_with("Setting conflict"));
    }

    #[test]
    fn unknown_code_maps_to_generic_description() {
        assert_eq!(describe_meter_error(9999), "Unknown error");
        assert_eq!(describe_meter_error(-77), "Unknown error");
    }
}
