//! Concrete [`rdsp_session::Subsystem`] implementations: one module per
//! protocol area, each owning its own packet types, capability namespace,
//! and per-connection state.

mod args;

pub mod audio;
pub mod bandwidth;
pub mod clipboard;
pub mod command;
pub mod cursor;
pub mod display;
pub mod encoding;
pub mod keyboard;
pub mod logging;
pub mod mmap;
pub mod notification;
pub mod pointer;
pub mod webcam;
pub mod window;

pub use audio::AudioSubsystem;
pub use bandwidth::BandwidthSubsystem;
pub use clipboard::ClipboardSubsystem;
pub use command::CommandSubsystem;
pub use cursor::CursorSubsystem;
pub use display::DisplaySubsystem;
pub use encoding::EncodingSubsystem;
pub use keyboard::KeyboardSubsystem;
pub use logging::LoggingSubsystem;
pub use mmap::MmapChannel;
pub use notification::NotificationSubsystem;
pub use pointer::PointerSubsystem;
pub use webcam::WebcamSubsystem;
pub use window::WindowSubsystem;
