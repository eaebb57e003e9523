use indicatif::{ProgressBar, ProgressStyle};
use starsample::RunObserver;

pub fn bar(header: String, length: u64) -> ProgressBar {
    let pb = ProgressBar::new(length);
    pb.set_prefix(header);
    pb.set_style(
        ProgressStyle::with_template("{prefix}...\n[{wide_bar:.cyan/blue}] {pos}/{len} blocks, {msg}")
            .expect("incorrect progress bar format string")
            .progress_chars("#>-"),
    );
    pb
}

/// Advances a progress bar once per sampled block.
#[derive(Default)]
pub struct BlockProgress {
    pb: Option<ProgressBar>,
    samples: u64,
}

impl BlockProgress {
    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish();
        }
    }
}

impl RunObserver for BlockProgress {
    fn on_start(&mut self, blocks: usize, nodes: usize) {
        self.pb = Some(bar(format!("Sampling {nodes} nodes"), blocks as u64));
    }

    fn on_block(&mut self, _block: usize, samples: usize) {
        self.samples += samples as u64;
        if let Some(pb) = &self.pb {
            pb.set_message(format!("{} samples", self.samples));
            pb.inc(1);
        }
    }
}
