fn main() -> anyhow::Result<()> {
    nebula_ide_lib::run()
}
