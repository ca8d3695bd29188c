#![no_main]

use std::sync::OnceLock;

use ed25519_dalek::SigningKey;
use libfuzzer_sys::fuzz_target;
use nft_provenance::{
    BundleValidator, MemoryLedger, SecretScalar, TraitCatalog, TraitCategory, ValidatorConfig, Verdict,
};

fn validator() -> &'static BundleValidator<MemoryLedger> {
    static V: OnceLock<BundleValidator<MemoryLedger>> = OnceLock::new();
    V.get_or_init(|| {
        let catalog = TraitCatalog::new(vec![TraitCategory::uniform("eyes", ["a", "b", "c"])]).unwrap();
        let config = ValidatorConfig {
            issuer_key: SigningKey::from_bytes(&[7u8; 32]).verifying_key().to_bytes(),
            vrf_public_key: SecretScalar::from_seed(&[8u8; 32]).unwrap().public_point().0,
            catalog,
            ..ValidatorConfig::default()
        };
        BundleValidator::new(&config, MemoryLedger::new()).unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else { return };
    // the ledger is empty, so nothing can verify
    assert!(!matches!(validator().validate_json(s), Verdict::Verified));
});
