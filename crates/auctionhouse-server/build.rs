fn main() {
    auctionhouse_build_info::emit("auctionhouse-server-v").expect("failed to emit build info");
}
