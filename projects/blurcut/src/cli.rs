use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the face-blur service
    #[arg(long, env = "BLURCUT_API_URL", default_value = "http://127.0.0.1:8000")]
    pub api_url: String,

    /// Directory holding review sessions
    #[arg(long, env = "BLURCUT_WORKDIR", default_value = "sessions")]
    pub workdir: PathBuf,

    /// Canvas width for composited output
    #[arg(long, default_value_t = 960)]
    pub canvas_width: u32,

    /// Canvas height for composited output
    #[arg(long, default_value_t = 540)]
    pub canvas_height: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a video and create a review session for it
    Upload {
        /// Video file (.mp4, .avi or .mov)
        file: PathBuf,
    },

    /// Start face analysis and wait for the results
    Analyze,

    /// Poll the active job's status once
    Status,

    /// List review sessions under the workdir
    Sessions,

    /// List tracked faces with blur flags and presence ranges
    Tracks,

    /// Set a track's blur flag
    SetBlur {
        /// Track id
        id: String,
        /// New flag value (true or false)
        on: bool,
    },

    /// Rename a track
    SetLabel {
        /// Track id
        id: String,
        /// New display label
        label: String,
    },

    /// Move a presence range's boundaries
    SetRange {
        /// Track id
        id: String,
        /// Index of the range within the track
        index: usize,
        /// New start frame
        #[arg(long)]
        start: Option<usize>,
        /// New end frame
        #[arg(long)]
        end: Option<usize>,
    },

    /// Select a track from the list, as clicking its row would
    Select {
        /// Track id
        id: String,
        /// Playback position for the highlighted snapshot
        #[arg(long, default_value_t = 0.0)]
        time: f64,
    },

    /// Click the canvas: toggles blur on the hit track and selects it
    Pick {
        /// Click x in element pixels
        x: f64,
        /// Click y in element pixels
        y: f64,
        /// Playback position in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        /// Displayed element width, when scaled by the page
        #[arg(long)]
        element_width: Option<f64>,
        /// Displayed element height, when scaled by the page
        #[arg(long)]
        element_height: Option<f64>,
    },

    /// Composite a single frame to an image
    Render {
        /// Frame index to render
        #[arg(long, conflicts_with = "time")]
        frame: Option<usize>,
        /// Playback position in seconds
        #[arg(long)]
        time: Option<f64>,
    },

    /// Composite a stretch of playback to numbered images
    Play {
        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        /// How many seconds to play
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
    },

    /// Push the current track edits to the server
    Save,

    /// Ask the server to render the blurred video and wait for it
    Export,

    /// Download the rendered video
    Download,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
