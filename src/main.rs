fn main() -> Result<(), Box<dyn std::error::Error>> {
    xang::cli::main()
}
