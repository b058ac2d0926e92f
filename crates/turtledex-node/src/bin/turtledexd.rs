fn main() -> turtledex_node::Result<()> {
    turtledex_node::run()
}
