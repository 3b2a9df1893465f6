//! Fuzz target: `decoder::decode`
//!
//! Feeds arbitrary buffers to every frame kind and checks that decoding
//! never panics, that short buffers are always dropped, and that every
//! accepted gated field lies inside its range.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowlink::metrics::MetricsAggregator;
use rowlink::protocol::decoder::{FrameKind, decode};

fuzz_target!(|data: &[u8]| {
    let mut metrics = MetricsAggregator::new();

    for kind in FrameKind::ALL {
        let Some(delta) = decode(kind, data) else {
            assert!(data.len() < kind.min_len(), "{kind:?} dropped a long buffer");
            continue;
        };
        assert!(data.len() >= kind.min_len());

        if let Some(rate) = delta.stroke_rate {
            assert!(rate > 0 && rate < 100);
        }
        if let Some(pace) = delta.pace_secs {
            assert!(pace > 0.0 && pace < 600.0);
        }
        if let Some(peak) = delta.peak_force {
            assert!(peak > 0.0 && peak < 500.0);
        }
        for power in [delta.power_w, delta.avg_power_w].into_iter().flatten() {
            assert!(power > 0 && power < 2000);
        }

        metrics.apply(kind, &delta, 0);
    }

    assert!(metrics.history().len() <= rowlink::metrics::FORCE_HISTORY_CAPACITY);
});
