pub mod candle_aux_layers;
pub mod candle_dae;
pub mod candle_data_loader;
pub mod candle_inference;
pub mod candle_loss_functions;
pub mod candle_model_decoder;
pub mod candle_model_encoder;
pub mod candle_model_traits;
pub mod candle_vae;
pub mod candle_vae_inference;
pub mod checkpoint;
pub mod cli;
pub mod dsprites_io;
pub mod event_log;
pub mod image_grid;
pub mod latent_traversal;

pub use candle_core;
pub use candle_nn;
