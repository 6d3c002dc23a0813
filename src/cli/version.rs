/// Display version information
pub fn execute() -> String {
    format!(
        "originbind {}\nPer-player IP binding for game servers",
        env!("CARGO_PKG_VERSION")
    )
}
