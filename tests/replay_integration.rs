//! Prioritized replay sampling against its declared distribution

use proptest::prelude::*;
use recon_agent::core::types::Transition;
use recon_agent::learning::{PrioritizedReplayBuffer, PRIORITY_EPSILON};

fn transition(tag: usize) -> Transition {
    let v = vec![tag as f32; 4];
    Transition::new(v.clone(), 0, 0.0, v, false)
}

#[test]
fn test_sampling_frequency_tracks_priority() {
    let mut buffer = PrioritizedReplayBuffer::new(16, 1.0, 0.4, 7);
    for i in 0..10 {
        buffer.add(transition(i));
    }
    let indices: Vec<usize> = (0..10).collect();
    let td: Vec<f32> = (1..=10).map(|p| p as f32 - PRIORITY_EPSILON as f32).collect();
    buffer.update_priorities(&indices, &td);

    let mut counts = [0usize; 10];
    let draws = 10_000;
    for _ in 0..draws / 5 {
        let batch = buffer.sample(5).unwrap();
        for i in batch.indices {
            counts[i] += 1;
        }
    }

    for (i, &count) in counts.iter().enumerate() {
        let expected = (i + 1) as f64 / 55.0;
        let observed = count as f64 / draws as f64;
        assert!(
            (observed - expected).abs() < 0.05,
            "index {}: observed {:.3}, expected {:.3}",
            i,
            observed,
            expected
        );
    }
}

#[test]
fn test_importance_weights_peak_at_one() {
    let mut buffer = PrioritizedReplayBuffer::new(8, 0.6, 1.0, 3);
    for i in 0..8 {
        buffer.add(transition(i));
    }
    buffer.update_priorities(&[0, 1, 2, 3], &[0.1, 5.0, 0.3, 2.0]);
    let batch = buffer.sample(8).unwrap();
    let max = batch.weights.iter().cloned().fold(f32::MIN, f32::max);
    assert!((max - 1.0).abs() < 1e-6);
    assert!(batch.weights.iter().all(|&w| w > 0.0 && w <= 1.0 + 1e-6));
}

proptest! {
    #[test]
    fn prop_priorities_stay_positive_and_normalized(
        capacity in 1usize..32,
        pushes in 1usize..64,
        td in prop::collection::vec(-50.0f32..50.0, 1..64),
        alpha in 0.0f32..1.0,
    ) {
        let mut buffer = PrioritizedReplayBuffer::new(capacity, alpha, 0.4, 11);
        for i in 0..pushes {
            buffer.add(transition(i));
        }
        let indices: Vec<usize> = (0..td.len()).map(|i| i % buffer.len()).collect();
        buffer.update_priorities(&indices, &td);

        prop_assert_eq!(buffer.len(), buffer.priorities().len());
        prop_assert!(buffer.len() <= capacity);
        prop_assert!(buffer.priorities().iter().all(|&p| p > 0.0));
        let total: f64 = buffer.probabilities().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
    }
}
