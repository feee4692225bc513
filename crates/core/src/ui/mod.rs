pub mod ui_sink;
