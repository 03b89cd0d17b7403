//! Web Audio output
//!
//! A `ScriptProcessorNode` with no inputs and two outputs asks for one block
//! at a time; each request is served straight from the ring buffer.

use nes_shell::audio::{AudioBackend, AudioConfig, AudioConsumer, AudioOutput, OpenError};
use nes_shell::ShellError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    AudioContext, AudioContextOptions, AudioContextState, AudioProcessingEvent, ScriptProcessorNode,
};

use crate::{console_warn, js_error_message};

/// Largest block a script processor accepts.
const MAX_BLOCK_FRAMES: usize = 16_384;
/// Smallest block a script processor accepts.
const MIN_BLOCK_FRAMES: usize = 256;

/// Script processors take power-of-two sizes between 256 and 16384.
fn processor_block_size(block_frames: usize) -> u32 {
    block_frames
        .clamp(MIN_BLOCK_FRAMES, MAX_BLOCK_FRAMES)
        .next_power_of_two()
        .min(MAX_BLOCK_FRAMES) as u32
}

/// Opens an `AudioContext` at the configured sample rate.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WebAudioBackend;

impl AudioBackend for WebAudioBackend {
    fn open(
        &mut self,
        consumer: AudioConsumer,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioOutput>, OpenError> {
        let output = WebAudioOutput::open(consumer, config)?;
        Ok(Box::new(output))
    }
}

/// An open `AudioContext` and the processor pulling the ring buffer.
pub(crate) struct WebAudioOutput {
    context: AudioContext,
    node: ScriptProcessorNode,
    _on_process: Closure<dyn FnMut(AudioProcessingEvent)>,
}

/// Only a running context pulls blocks; `suspended` covers autoplay blocking.
fn is_pulling(state: AudioContextState) -> bool {
    state == AudioContextState::Running
}

impl WebAudioOutput {
    fn open(consumer: AudioConsumer, config: &AudioConfig) -> Result<Self, OpenError> {
        let options = AudioContextOptions::new();
        options.set_sample_rate(config.sample_rate as f32);

        let context = match AudioContext::new_with_context_options(&options) {
            Ok(context) => context,
            Err(e) => {
                return Err(OpenError::new(
                    format!("Failed to create AudioContext: {}", js_error_message(&e)),
                    consumer,
                ))
            }
        };

        let block = processor_block_size(config.block_frames);
        let node = match context
            .create_script_processor_with_buffer_size_and_number_of_input_channels_and_number_of_output_channels(
                block, 0, 2,
            ) {
            Ok(node) => node,
            Err(e) => {
                let _ = context.close();
                return Err(OpenError::new(
                    format!("Failed to create script processor: {}", js_error_message(&e)),
                    consumer,
                ));
            }
        };

        if let Err(e) = node.connect_with_audio_node(&context.destination()) {
            let _ = context.close();
            return Err(OpenError::new(
                format!("Failed to connect audio graph: {}", js_error_message(&e)),
                consumer,
            ));
        }

        let on_process = process_callback(consumer, block as usize);
        node.set_onaudioprocess(Some(on_process.as_ref().unchecked_ref()));

        // Created outside a user gesture the context starts suspended
        let mut output = WebAudioOutput {
            context,
            node,
            _on_process: on_process,
        };
        if let Err(err) = output.resume() {
            console_warn!("{err}");
        }
        Ok(output)
    }
}

fn process_callback(
    mut consumer: AudioConsumer,
    block: usize,
) -> Closure<dyn FnMut(AudioProcessingEvent)> {
    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];

    Closure::wrap(Box::new(move |event: AudioProcessingEvent| {
        let Ok(buffer) = event.output_buffer() else {
            return;
        };
        let frames = buffer.length() as usize;
        if left.len() != frames {
            left.resize(frames, 0.0);
            right.resize(frames, 0.0);
        }

        // Short reads come back zero-filled
        consumer.pull_planar_into(&mut left, &mut right);

        if buffer.copy_to_channel(&mut left, 0).is_err()
            || buffer.copy_to_channel(&mut right, 1).is_err()
        {
            console_warn!("Failed to write audio block");
        }
    }) as Box<dyn FnMut(AudioProcessingEvent)>)
}

impl AudioOutput for WebAudioOutput {
    fn resume(&mut self) -> nes_shell::Result<()> {
        self.context.resume().map_err(|e| {
            ShellError::DeviceUnavailable(format!(
                "AudioContext resume failed: {}",
                js_error_message(&e)
            ))
        })?;
        Ok(())
    }

    fn suspend(&mut self) -> nes_shell::Result<()> {
        self.context.suspend().map_err(|e| {
            ShellError::DeviceUnavailable(format!(
                "AudioContext suspend failed: {}",
                js_error_message(&e)
            ))
        })?;
        Ok(())
    }

    /// Reflects the context's actual state. `resume()` settles
    /// asynchronously, so this stays false until the browser lets it run.
    fn is_running(&self) -> bool {
        is_pulling(self.context.state())
    }
}

impl Drop for WebAudioOutput {
    fn drop(&mut self) {
        self.node.set_onaudioprocess(None);
        let _ = self.node.disconnect();
        let _ = self.context.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_defaults_to_4096() {
        assert_eq!(processor_block_size(4096), 4096);
    }

    #[test]
    fn block_size_rounds_up_to_power_of_two() {
        assert_eq!(processor_block_size(735), 1024);
        assert_eq!(processor_block_size(3000), 4096);
    }

    #[test]
    fn only_running_context_counts_as_pulling() {
        assert!(is_pulling(AudioContextState::Running));
        assert!(!is_pulling(AudioContextState::Suspended));
        assert!(!is_pulling(AudioContextState::Closed));
    }

    #[test]
    fn block_size_is_clamped() {
        assert_eq!(processor_block_size(1), 256);
        assert_eq!(processor_block_size(100_000), 16_384);
    }
}
