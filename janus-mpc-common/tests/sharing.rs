use janus_mpc_common::{
    config::{BioKind, BioSetting, DistanceMetric},
    sharing::{combine, secret_share, share_database},
    template::{plain_membership, BiometricTemplate},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rstest::rstest;

#[rstest]
#[case(1, false)]
#[case(1, true)]
#[case(4, false)]
#[case(8, false)]
fn test_shares_reconstruct(#[case] bits_per_slot: u8, #[case] masked: bool) {
    let mut rng = ChaCha8Rng::seed_from_u64(bits_per_slot as u64);
    let template = if masked {
        BiometricTemplate::random_masked(&mut rng, 200)
    } else {
        BiometricTemplate::random(&mut rng, 200, bits_per_slot)
    };
    let (s1, s2) = secret_share(&template, &mut rng);
    assert_eq!(s1.mask().is_some(), masked);
    assert_eq!(combine(&s1, &s2).unwrap(), template);
    assert_eq!(combine(&s2, &s1).unwrap(), template);
}

#[test]
fn test_shared_database_keeps_membership() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let setting = BioSetting::with_defaults(BioKind::Finger, 3, 2, 32)
        .unwrap()
        .with_threshold(2_000)
        .unwrap();
    let query = BiometricTemplate::random(&mut rng, 32, 8);
    let db: Vec<_> = (0..setting.db_size())
        .map(|_| BiometricTemplate::random(&mut rng, 32, 8))
        .collect();
    let (rs, bp) = share_database(&db, &mut rng);
    let rebuilt: Vec<_> = rs
        .iter()
        .zip(bp.iter())
        .map(|(a, b)| combine(a, b).unwrap())
        .collect();
    assert_eq!(rebuilt, db);
    assert_eq!(
        plain_membership(&setting, &query, &rebuilt),
        plain_membership(&setting, &query, &db)
    );
}

#[test]
fn test_setting_serializes() {
    let setting = BioSetting::with_defaults(BioKind::Iris, 8, 2, 256)
        .unwrap()
        .with_metric(DistanceMetric::Hamming)
        .unwrap();
    let json = serde_json::to_string(&setting).unwrap();
    assert!(json.contains("\"metric\":\"hamming\""));
    let back: BioSetting = serde_json::from_str(&json).unwrap();
    assert_eq!(back, setting);
}
