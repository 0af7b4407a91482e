use auctionhouse_build_info::BuildInfo;

pub const BUILD_INFO: BuildInfo = auctionhouse_build_info::get!();
