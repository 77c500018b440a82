mod master;
mod network;
mod slave;
mod sut;

pub use self::{
    master::{MasterNetworkListener, SlaveHandle},
    network::NetworkProtocolStack,
    slave::{HarnessInfoHandler, SlaveNetworkStack},
    sut::{spawn_sut, SutIo, SutProtocolStack},
};
