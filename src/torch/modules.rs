//! Convolutional action-value networks
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::{nn, nn::Module, Tensor};
use thiserror::Error;

/// A 2D convolution layer with a square kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvLayer {
    pub filters: i64,
    pub kernel: i64,
    pub stride: i64,
}

impl ConvLayer {
    #[must_use]
    pub const fn new(filters: i64, kernel: i64, stride: i64) -> Self {
        Self {
            filters,
            kernel,
            stride,
        }
    }

    /// Padding such that the output size is the input size divided by the stride.
    const fn padding(&self) -> i64 {
        if self.kernel > self.stride {
            (self.kernel - self.stride) / 2
        } else {
            0
        }
    }

    /// Output side length for an input side length, if the kernel fits.
    const fn output_size(&self, input: i64) -> Option<i64> {
        let padded = input + 2 * self.padding();
        if padded < self.kernel || self.stride < 1 {
            None
        } else {
            Some((padded - self.kernel) / self.stride + 1)
        }
    }
}

/// Configuration of a [`QNetwork`]: convolution layers followed by a fully-connected head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QNetConfig {
    pub convs: Vec<ConvLayer>,
    /// Hidden layer sizes of the fully-connected head.
    pub hiddens: Vec<i64>,
    /// Separate state-value and advantage streams.
    pub dueling: bool,
}

impl Default for QNetConfig {
    fn default() -> Self {
        Self {
            convs: vec![ConvLayer::new(16, 8, 4), ConvLayer::new(32, 4, 2)],
            hiddens: vec![256],
            dueling: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildNetworkError {
    #[error("screen of size {screen_size} is too small for the convolution layers")]
    ScreenTooSmall { screen_size: usize },
    #[error("a network needs at least one action")]
    NoActions,
}

impl QNetConfig {
    /// Build a network for `screen_size x screen_size` single-channel inputs.
    pub fn build_network<'a, T: Borrow<nn::Path<'a>>>(
        &self,
        vs: T,
        screen_size: usize,
        num_actions: usize,
    ) -> Result<QNetwork, BuildNetworkError> {
        let vs = vs.borrow();
        if num_actions == 0 {
            return Err(BuildNetworkError::NoActions);
        }
        let mut side = i64::try_from(screen_size)
            .map_err(|_| BuildNetworkError::ScreenTooSmall { screen_size })?;
        let mut channels = 1;
        let mut convs = Vec::with_capacity(self.convs.len());
        for (i, layer) in self.convs.iter().enumerate() {
            let conv_config = nn::ConvConfig {
                stride: layer.stride,
                padding: layer.padding(),
                ..nn::ConvConfig::default()
            };
            convs.push(nn::conv2d(
                vs / format!("conv{}", i),
                channels,
                layer.filters,
                layer.kernel,
                conv_config,
            ));
            channels = layer.filters;
            side = layer
                .output_size(side)
                .ok_or(BuildNetworkError::ScreenTooSmall { screen_size })?;
        }
        let conv_features = channels * side * side;

        #[allow(clippy::cast_possible_wrap)]
        let num_actions = num_actions as i64;
        let action_stream = Mlp::new(&(vs / "action"), conv_features, &self.hiddens, num_actions);
        let value_stream = if self.dueling {
            Some(Mlp::new(&(vs / "value"), conv_features, &self.hiddens, 1))
        } else {
            None
        };
        Ok(QNetwork {
            convs,
            action_stream,
            value_stream,
        })
    }
}

/// Fully-connected stream with ReLU hidden layers.
#[derive(Debug)]
struct Mlp {
    hidden: Vec<nn::Linear>,
    output: nn::Linear,
}

impl Mlp {
    fn new(vs: &nn::Path, input: i64, hiddens: &[i64], output: i64) -> Self {
        let mut hidden = Vec::with_capacity(hiddens.len());
        let mut size = input;
        for (i, &hidden_size) in hiddens.iter().enumerate() {
            hidden.push(nn::linear(
                vs / format!("hidden{}", i),
                size,
                hidden_size,
                Default::default(),
            ));
            size = hidden_size;
        }
        let output = nn::linear(vs / "output", size, output, Default::default());
        Self { hidden, output }
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let features = self
            .hidden
            .iter()
            .fold(xs.shallow_clone(), |x, layer| layer.forward(&x).relu());
        self.output.forward(&features)
    }
}

/// Action values for each screen column (or row) given a single-channel screen.
///
/// Input shape `[batch, 1, size, size]`, output shape `[batch, num_actions]`.
#[derive(Debug)]
pub struct QNetwork {
    convs: Vec<nn::Conv2D>,
    action_stream: Mlp,
    /// State value stream of a dueling network.
    value_stream: Option<Mlp>,
}

impl Module for QNetwork {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let features = self
            .convs
            .iter()
            .fold(xs.shallow_clone(), |x, conv| conv.forward(&x).relu())
            .flatten(1, -1);
        let action_scores = self.action_stream.forward(&features);
        match &self.value_stream {
            Some(value_stream) => {
                let state_score = value_stream.forward(&features);
                let mean_score = action_scores.mean_dim(&[1], true, action_scores.kind());
                state_score + (&action_scores - mean_score)
            }
            None => action_scores,
        }
    }
}
