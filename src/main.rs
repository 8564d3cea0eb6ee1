fn main() {
    bracket_engine::run()
}
