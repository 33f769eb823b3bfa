pub mod gradio;
pub mod openai_chat;
