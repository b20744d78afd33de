use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    causerie::cli::main()
}
