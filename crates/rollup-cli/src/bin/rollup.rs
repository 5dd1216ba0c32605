fn main() -> anyhow::Result<()> {
    rollup_cli::cli::run()
}
