pub mod detect_masks_use_case;
pub mod inference_context;
pub mod infrastructure;
pub mod pipeline_logger;
pub mod stream_masks_use_case;
