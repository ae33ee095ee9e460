use libc::{ c_void, linger, setsockopt, socklen_t, SOL_SOCKET, SO_LINGER };
use std::io;
use std::os::unix::io::RawFd;

/// Makes `close` on `fd` abort the connection with RST instead of a FIN
/// handshake. Unsent data is discarded.
pub fn set_linger_reset(fd: RawFd) -> io::Result<()> {
    let opt = linger { l_onoff: 1, l_linger: 0 };
    let res = unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_LINGER,
            &opt as *const linger as *const c_void,
            std::mem::size_of::<linger>() as socklen_t
        )
    };
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
