//! Fuzz target: `csafe::parse_frame` / `csafe::identify`
//!
//! Arbitrary bytes must never panic the parser.  Anything it accepts as a
//! configure-workout command must re-encode to the identical frame.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowlink::protocol::csafe::{self, CommandKind};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = csafe::parse_frame(data) {
        assert_eq!(payload.len() + 3, data.len());
        assert_eq!(csafe::checksum(payload), data[data.len() - 2]);
    }

    match csafe::identify(data) {
        Ok(CommandKind::Reset) => assert_eq!(data, csafe::reset_command()),
        Ok(CommandKind::ConfigureWorkout { distance_m }) => {
            assert_eq!(data, csafe::configure_workout_command(distance_m));
        }
        Err(_) => {}
    }
});
