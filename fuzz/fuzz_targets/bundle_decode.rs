#![no_main]

use libfuzzer_sys::fuzz_target;
use nft_provenance::ProofBundle;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else { return };
    if let Ok(bundle) = ProofBundle::from_json(s) {
        // anything accepted must re-encode and decode to itself
        let json = bundle.to_json().unwrap();
        assert_eq!(ProofBundle::from_json(&json).unwrap(), bundle);
    }
});
