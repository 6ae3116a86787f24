//! passbench binary entry point.

fn main() -> anyhow::Result<()> {
    passbench_cli::run()
}
