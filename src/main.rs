fn main() {
    stereopose_lib::run()
}
