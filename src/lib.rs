pub mod config;
pub mod html;
pub mod lint;
pub mod livereload;
pub mod server;
pub mod style;
pub mod supervisor;
pub mod tasks;
pub mod template;
pub mod watch;
