mod settings;

pub use settings::{
    save_model_name, save_model_name_to, Config, ModelConfig, PromptConfig, EXAMPLE_CONFIG,
};
