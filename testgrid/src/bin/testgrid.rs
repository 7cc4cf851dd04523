//! `testgrid` command line over the built-in catalog

fn main() -> anyhow::Result<()> {
    testgrid::run()
}
