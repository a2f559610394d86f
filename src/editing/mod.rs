/*!
 * Timestamp correction.
 *
 * - `timestamps`: id resolution and the single-boundary commit protocol
 * - `waveform`: envelope rendering and click gestures
 * - `selection`: beginning/ending range for batch operations
 * - `batch`: proportional redistribution and server-side alignment over a range
 */

pub mod batch;
pub mod selection;
pub mod timestamps;
pub mod waveform;

pub use selection::SelectionRange;
pub use timestamps::Boundary;
pub use waveform::{ClickModifier, RenderSurface, WaveformClick, WaveformEditor};
