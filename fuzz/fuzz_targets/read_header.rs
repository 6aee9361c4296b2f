#![no_main]
use bids_normalizer::HeaderGeometry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(geometry) = HeaderGeometry::from_reader(data) {
        assert!(geometry.ndim() >= 1 && geometry.ndim() <= 7);
        let _ = geometry.shape();
        let _ = geometry.slice_count();
    }
});
