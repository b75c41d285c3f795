use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{Distribution, Tensor, TensorData};
use burn_ndarray::NdArray;
use models::prelude::*;

type B = Autodiff<NdArray<f32>>;

fn config() -> SpatialTemporalConfig {
    SpatialTemporalConfig {
        sequence_length: 3,
        frame_height: 6,
        frame_width: 6,
        extractor_channels: 4,
        hidden_size: 4,
        dropout: 0.0,
    }
}

fn to_vec<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

#[test]
fn optimizer_step_leaves_extractor_untouched() {
    let device = Default::default();
    let mut model = SpatialTemporalModel::<B>::new(config(), &device);
    let mut optim = AdamConfig::new().init();

    let frames: Tensor<B, 4> = Tensor::random([2, 3, 6, 6], Distribution::Uniform(0.0, 1.0), &device);
    let input: Tensor<B, 5> =
        Tensor::random([2, 3, 6, 6, 3], Distribution::Uniform(0.0, 1.0), &device);
    let targets = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [2, 1]), &device);

    let features_before = to_vec(model.extractor().forward(frames.clone()));
    let probs_before = to_vec(model.forward(input.clone()));

    for _ in 0..3 {
        let loss = binary_cross_entropy(model.forward(input.clone()), targets.clone());
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(1e-2, model, grads);
    }

    assert_eq!(to_vec(model.extractor().forward(frames)), features_before);
    assert_ne!(to_vec(model.forward(input)), probs_before);
}
