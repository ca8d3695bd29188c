//! Property-based tests for nft-provenance

use nft_provenance::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Honest proofs verify and are reproducible for any key and α
    #[test]
    fn prove_then_verify(seed in prop::array::uniform32(any::<u8>()), alpha in prop::collection::vec(any::<u8>(), 0..96)) {
        let sk = SecretScalar::from_seed(&seed).unwrap();
        let y = sk.public_point();
        let (beta, proof) = sk.prove(&alpha).unwrap();
        prop_assert_eq!(verify(&y, &alpha, &beta, &proof), Ok(()));
        prop_assert_eq!(proof_to_hash(&proof).unwrap(), beta);
        let (beta2, proof2) = sk.prove(&alpha).unwrap();
        prop_assert_eq!(beta, beta2);
        prop_assert_eq!(proof, proof2);
    }

    // A proof never transfers to a different α
    #[test]
    fn proof_binds_alpha(seed in prop::array::uniform32(any::<u8>()), a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
        prop_assume!(a != b);
        let sk = SecretScalar::from_seed(&seed).unwrap();
        let (beta, proof) = sk.prove(a.as_bytes()).unwrap();
        prop_assert!(verify(&sk.public_point(), b.as_bytes(), &beta, &proof).is_err());
    }
}

proptest! {
    // Selected value is always in the pool and the tier matches the roll
    #[test]
    fn derived_traits_are_well_formed(beta in prop::collection::vec(any::<u8>(), 64..=64), pool in 1usize..300) {
        let beta = VrfOutput::try_from(beta.as_slice()).unwrap();
        let catalog = TraitCatalog::new(vec![
            TraitCategory::uniform("pool", (0..pool).map(|i| i.to_string())),
            TraitCategory::weighted("w", [("a", 1), ("b", 0), ("c", 7)]),
        ]).unwrap();
        let traits = derive_traits(&beta, &catalog).unwrap();
        let t = &traits["pool"];
        prop_assert!(t.value.parse::<usize>().unwrap() < pool);
        prop_assert!(t.roll < 100);
        prop_assert_eq!(t.tier, Tier::from_roll(t.roll));
        prop_assert_eq!(t.rarity_pct, t.tier.rarity_pct());
        prop_assert_ne!(traits["w"].value.as_str(), "b");
        prop_assert_eq!(verify_traits(&beta, &catalog, &traits), Ok(()));
    }

    // Every leaf of every tree size authenticates against the root
    #[test]
    fn merkle_paths_verify(n in 1usize..40, pick in any::<prop::sample::Index>()) {
        let leaves: Vec<Hash256> = (0..n).map(|i| {
            let mut l = [0u8; 32];
            l[..8].copy_from_slice(&(i as u64).to_le_bytes());
            l
        }).collect();
        let tree = MerkleTree::from_leaves(leaves).unwrap();
        let i = pick.index(n);
        let p = tree.proof(i).unwrap();
        prop_assert_eq!(p.verify(), Ok(()));
        prop_assert!(verify_merkle_path(&p.leaf, &p.path, &tree.root()));
    }

    // Flipping any sibling bit breaks the path
    #[test]
    fn merkle_sibling_tamper(n in 2usize..20, pick in any::<prop::sample::Index>(), bit in 0usize..256) {
        let leaves: Vec<Hash256> = (0..n).map(|i| [u8::try_from(i).unwrap(); 32]).collect();
        let tree = MerkleTree::from_leaves(leaves).unwrap();
        let mut p = tree.proof(pick.index(n)).unwrap();
        let level = bit % p.path.len();
        p.path[level].sibling[bit / 8] ^= 1 << (bit % 8);
        prop_assert_eq!(p.verify(), Err(merkle::MerkleError::PathInvalid));
    }

    // Arbitrary input never panics the decoder
    #[test]
    fn bundle_decoder_total(s in ".{0,256}") {
        let _ = ProofBundle::from_json(&s);
    }
}
