/// Entry point for the persistent QVM server
///
/// This is a thin wrapper that delegates to the library crate.
fn main() -> anyhow::Result<()> {
    pqvm_lib::run()
}
