use m4rmul::{naive, transpose, BitMatrix, Config, Device, Engine, M4rError};
use proptest::prelude::*;
use rand::prelude::*;

fn engine(config: Config) -> Engine {
    let device = Device::with_threads(&config, 4, usize::MAX).unwrap();
    Engine::with_device(config, device).unwrap()
}

fn random_pair(seed: u64, n: usize) -> (BitMatrix, BitMatrix) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let a = BitMatrix::random(&mut rng, n, n);
    let b = BitMatrix::random(&mut rng, n, n);
    (a, b)
}

fn dimension() -> impl Strategy<Value = usize> {
    prop_oneof![Just(32usize), Just(64), Just(128), Just(256)]
}

fn strategy() -> impl Strategy<Value = m4rmul::Strategy> {
    prop::sample::select(m4rmul::Strategy::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn transpose_is_an_involution(seed in any::<u64>(), rows in 1..200usize, cols in 1..200usize) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let m = BitMatrix::random(&mut rng, rows, cols);
        let m_tr = transpose(&m);
        prop_assert_eq!((m_tr.rows(), m_tr.cols()), (cols, rows));
        for i in 0..rows {
            for j in 0..cols {
                prop_assert_eq!(m_tr[(j, i)], m[(i, j)]);
            }
        }
        prop_assert_eq!(transpose(&m_tr), m);
    }

    #[test]
    fn strategies_agree_with_naive(seed in any::<u64>(), n in dimension(), strategy in strategy()) {
        let engine = engine(Config::default().with_block_size(32));
        let (a, b) = random_pair(seed, n);
        prop_assert_eq!(engine.multiply(strategy, &a, &b).unwrap(), naive::multiply(&a, &b).unwrap());
    }

    #[test]
    fn multiplication_is_linear(seed in any::<u64>(), n in dimension(), strategy in strategy()) {
        let engine = engine(Config::default().with_block_size(32));
        let mut rng = SmallRng::seed_from_u64(seed);
        let a = BitMatrix::random(&mut rng, n, n);
        let b1 = BitMatrix::random(&mut rng, n, n);
        let b2 = BitMatrix::random(&mut rng, n, n);
        let sum = engine.multiply(strategy, &a, &(&b1 ^ &b2)).unwrap();
        let parts = &engine.multiply(strategy, &a, &b1).unwrap() ^ &engine.multiply(strategy, &a, &b2).unwrap();
        prop_assert_eq!(sum, parts);
    }

    #[test]
    fn subvector_widths_agree(seed in any::<u64>(), k in prop::sample::select(vec![1usize, 2, 4, 8, 16])) {
        let engine = engine(Config::default().with_subvector_width(k).with_block_size(8 * k));
        let (a, b) = random_pair(seed, 128);
        let expected = naive::multiply(&a, &b).unwrap();
        prop_assert_eq!(engine.multiply(m4rmul::Strategy::M4r, &a, &b).unwrap(), expected.clone());
        prop_assert_eq!(engine.multiply(m4rmul::Strategy::DeviceM4r, &a, &b).unwrap(), expected.clone());
        prop_assert_eq!(engine.multiply(m4rmul::Strategy::Streamed, &a, &b).unwrap(), expected);
    }
}

#[test]
fn large_dimension() {
    let engine = engine(Config::default());
    let mut rng = SmallRng::seed_from_u64(1024);
    let passed = engine
        .verify_sizes(&mut rng, &[1024], m4rmul::Strategy::Naive)
        .unwrap();
    assert_eq!(passed, vec![true]);

    let (a, b) = random_pair(7, 1024);
    let expected = naive::multiply(&a, &b).unwrap();
    for strategy in [
        m4rmul::Strategy::M4r,
        m4rmul::Strategy::DeviceM4r,
        m4rmul::Strategy::Direct,
        m4rmul::Strategy::Streamed,
    ] {
        assert_eq!(engine.multiply(strategy, &a, &b).unwrap(), expected, "{strategy}");
    }
}

#[test]
fn identity_and_zero() {
    let engine = engine(Config::default());
    let (a, _) = random_pair(3, 256);
    let id = BitMatrix::identity(256);
    let zero = BitMatrix::zeros(256, 256);
    for strategy in m4rmul::Strategy::ALL {
        assert_eq!(engine.multiply(strategy, &a, &id).unwrap(), a, "{strategy}");
        assert_eq!(engine.multiply(strategy, &id, &a).unwrap(), a, "{strategy}");
        assert!(engine.multiply(strategy, &a, &zero).unwrap().is_zero(), "{strategy}");
    }
}

#[test]
fn streamed_runs_are_repeatable() {
    let config = Config::default().with_subvector_width(4).with_block_size(32);
    let engine = engine(config);
    let (a, b) = random_pair(11, 512);
    let first = engine.multiply(m4rmul::Strategy::Streamed, &a, &b).unwrap();
    for _ in 0..3 {
        assert_eq!(engine.multiply(m4rmul::Strategy::Streamed, &a, &b).unwrap(), first);
    }
    assert_eq!(first, naive::multiply(&a, &b).unwrap());
}

#[test]
fn bad_inputs_are_rejected_by_every_strategy() {
    let engine = engine(Config::default());
    let a = BitMatrix::zeros(64, 64);
    let b = BitMatrix::zeros(128, 128);
    let odd = BitMatrix::zeros(40, 40);
    for strategy in m4rmul::Strategy::ALL {
        assert!(
            matches!(engine.multiply(strategy, &a, &b), Err(M4rError::DimensionMismatch { .. })),
            "{strategy}"
        );
        assert!(
            matches!(engine.multiply(strategy, &odd, &odd), Err(M4rError::DimensionMismatch { .. })),
            "{strategy}"
        );
    }
}

#[test]
fn invalid_configs() {
    let config = Config::default();
    assert!(matches!(
        Engine::new(config.with_subvector_width(17)),
        Err(M4rError::InvalidConfig(_))
    ));
    assert!(matches!(
        Engine::new(config.with_block_size(100)),
        Err(M4rError::InvalidConfig(_))
    ));
    assert!(matches!(
        Engine::new(config.with_max_threads_per_block(0)),
        Err(M4rError::InvalidConfig(_))
    ));
}

#[test]
fn device_budget_exhaustion_releases_memory() {
    let config = Config::default();
    let device = Device::with_threads(&config, 2, 4096).unwrap();
    let engine = Engine::with_device(config, device).unwrap();
    let (a, b) = random_pair(5, 256);
    for strategy in [
        m4rmul::Strategy::DeviceM4r,
        m4rmul::Strategy::Direct,
        m4rmul::Strategy::Streamed,
    ] {
        assert!(
            matches!(engine.multiply(strategy, &a, &b), Err(M4rError::ResourceExhaustion { .. })),
            "{strategy}"
        );
        assert_eq!(engine.device().allocated_bytes(), 0);
    }
}
