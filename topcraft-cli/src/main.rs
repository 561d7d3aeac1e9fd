fn main() -> anyhow::Result<()> {
    topcraft_cli::run()
}
