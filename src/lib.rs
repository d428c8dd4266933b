mod assembler;
mod decoder;
mod engine;
mod error;
mod midi_importer;
mod model;
mod player;
mod report;
mod tempo;
mod theory;
mod timeline;
mod util;

pub use assembler::*;
pub use decoder::*;
pub use engine::judge::*;
pub use engine::metrics::*;
pub use engine::scheduler::*;
pub use engine::session::*;
pub use engine::*;
pub use error::*;
pub use midi_importer::{decode_source, import_midi_file, midi_bytes_to_song, parse_midi_bytes, smf_to_source};
pub use model::config::*;
pub use model::song::*;
pub use model::source::*;
pub use player::*;
pub use report::*;
pub use tempo::*;
pub use theory::*;
pub use timeline::*;
pub use util::*;
