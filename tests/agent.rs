use std::collections::BTreeMap;

use candle_nn::VarMap;
use pixel_dqn::agent::argmax;
use pixel_dqn::network::{ConvLayerConfig, ConvNetConfig};
use pixel_dqn::{AgentConfig, DeviceStrategy, DqnAgent, DqnError, Frame, FrameConfig, TargetSync};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ACTIONS: usize = 4;

fn frame_config() -> FrameConfig {
    FrameConfig {
        height: 32,
        width: 32,
        channels: 3,
    }
}

fn conv_config() -> ConvNetConfig {
    ConvNetConfig {
        conv_layers: vec![ConvLayerConfig::new(8, 8, 4), ConvLayerConfig::new(16, 4, 2)],
        hidden: vec![32, 16],
    }
}

fn agent_with(config: AgentConfig) -> DqnAgent {
    DqnAgent::new(
        config,
        frame_config(),
        &conv_config(),
        ACTIONS,
        DeviceStrategy::Cpu,
    )
    .unwrap()
}

fn random_frame(rng: &mut StdRng) -> Frame {
    let pixels = (0..40 * 48 * 3).map(|_| rng.random::<u8>()).collect();
    Frame::new(40, 48, 3, pixels).unwrap()
}

fn snapshot(vars: &VarMap) -> BTreeMap<String, Vec<f32>> {
    let data = vars.data().lock().unwrap();
    data.iter()
        .map(|(name, var)| {
            let values = var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
            (name.clone(), values)
        })
        .collect()
}

#[test]
fn greedy_action_is_deterministic_argmax() {
    let mut agent = agent_with(AgentConfig {
        seed: Some(1),
        ..Default::default()
    });
    let mut rng = StdRng::seed_from_u64(10);
    let params_before = snapshot(agent.online_vars());

    for _ in 0..10 {
        let frame = random_frame(&mut rng);
        let values = agent.action_values(&frame).unwrap();
        assert_eq!(values.len(), ACTIONS);
        let expected = argmax(&values);
        for _ in 0..3 {
            assert_eq!(agent.act(&frame, 0.0).unwrap(), expected);
        }
    }
    // Acting never touches the parameters or normalization statistics.
    assert_eq!(snapshot(agent.online_vars()), params_before);
}

#[test]
fn full_exploration_is_uniform() {
    let mut agent = agent_with(AgentConfig {
        seed: Some(2),
        ..Default::default()
    });
    let frame = random_frame(&mut StdRng::seed_from_u64(0));

    let trials = 4000;
    let mut counts = [0usize; ACTIONS];
    for _ in 0..trials {
        counts[agent.act(&frame, 1.0).unwrap()] += 1;
    }
    for (action, &count) in counts.iter().enumerate() {
        let freq = count as f64 / trials as f64;
        assert!(
            (freq - 0.25).abs() < 0.03,
            "action {action} drawn with frequency {freq}"
        );
    }
}

#[test]
fn observe_rejects_out_of_range_action() {
    let mut agent = agent_with(AgentConfig::default());
    let mut rng = StdRng::seed_from_u64(3);
    let (s, s2) = (random_frame(&mut rng), random_frame(&mut rng));

    let err = agent.observe(&s, ACTIONS, 1.0, &s2, false).unwrap_err();
    assert!(matches!(
        err,
        DqnError::InvalidActionIndex {
            action: ACTIONS,
            action_count: ACTIONS
        }
    ));
    assert!(agent.memory().is_empty());
}

#[test]
fn malformed_frame_is_reported() {
    let mut agent = agent_with(AgentConfig::default());
    let frame = Frame::new(10, 10, 2, vec![0; 200]).unwrap();
    assert!(matches!(
        agent.act(&frame, 0.0),
        Err(DqnError::MalformedObservation(_))
    ));
}

#[test]
fn one_learning_step_per_observe_from_the_65th_push() {
    let mut agent = agent_with(AgentConfig {
        memory_capacity: 100,
        minibatch_size: 64,
        target_sync: TargetSync::Never,
        seed: Some(42),
        ..Default::default()
    });
    let mut rng = StdRng::seed_from_u64(5);
    let target_before = snapshot(agent.target_vars());
    assert_eq!(snapshot(agent.online_vars()), target_before);

    for push in 1..=70 {
        let online_before = snapshot(agent.online_vars());
        let (s, s2) = (random_frame(&mut rng), random_frame(&mut rng));
        let loss = agent
            .observe(&s, push % ACTIONS, 1.0, &s2, push % 10 == 0)
            .unwrap();

        assert_eq!(agent.memory().len(), push);
        if push < 65 {
            assert!(loss.is_none(), "learned early at push {push}");
            assert_eq!(agent.learn_steps(), 0);
            assert_eq!(snapshot(agent.online_vars()), online_before);
        } else {
            let loss = loss.expect("no learning step");
            assert!(loss.is_finite());
            assert_eq!(agent.learn_steps(), push - 64);
            assert_ne!(snapshot(agent.online_vars()), online_before);
        }
        assert_eq!(snapshot(agent.target_vars()), target_before);
    }

    agent.sync_target().unwrap();
    assert_eq!(snapshot(agent.target_vars()), snapshot(agent.online_vars()));
}

#[test]
fn hard_sync_policy_copies_on_schedule() {
    let mut agent = agent_with(AgentConfig {
        memory_capacity: 20,
        minibatch_size: 4,
        target_sync: TargetSync::Hard { every: 2 },
        seed: Some(8),
        ..Default::default()
    });
    let mut rng = StdRng::seed_from_u64(6);
    let initial_target = snapshot(agent.target_vars());

    // Fifth push runs learning step 1, sixth runs step 2.
    for push in 1..=5 {
        let (s, s2) = (random_frame(&mut rng), random_frame(&mut rng));
        agent.observe(&s, push % ACTIONS, 0.5, &s2, false).unwrap();
    }
    assert_eq!(agent.learn_steps(), 1);
    assert_eq!(snapshot(agent.target_vars()), initial_target);

    let (s, s2) = (random_frame(&mut rng), random_frame(&mut rng));
    agent.observe(&s, 0, 0.5, &s2, true).unwrap();
    assert_eq!(agent.learn_steps(), 2);
    assert_eq!(snapshot(agent.target_vars()), snapshot(agent.online_vars()));
}

#[test]
fn memory_evicts_beyond_capacity() {
    let mut agent = agent_with(AgentConfig {
        memory_capacity: 8,
        minibatch_size: 2,
        target_sync: TargetSync::Never,
        seed: Some(4),
        ..Default::default()
    });
    let mut rng = StdRng::seed_from_u64(9);
    for push in 0..12 {
        let (s, s2) = (random_frame(&mut rng), random_frame(&mut rng));
        agent.observe(&s, 0, push as f32, &s2, false).unwrap();
        assert!(agent.memory().len() <= 8);
    }
    let rewards: Vec<f32> = agent.memory().iter().map(|t| t.reward).collect();
    assert_eq!(rewards, vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
}
