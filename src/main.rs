fn main() {
    cazzmachine_lib::run()
}
