use anyhow::Result;

fn main() -> Result<()> {
    storebench_harness::cli::execute()
}
