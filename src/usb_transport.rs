//! libusb-backed device transport (cargo feature `usb`).
//!
//! Safe wrapper around the libusb FFI bindings implementing the
//! [`Transport`] boundary for real UVC hardware: open by vendor/product ID,
//! walk the active configuration descriptor for a video-streaming interface
//! with a usable IN endpoint, claim it (detaching a kernel driver when one
//! is attached), then read chunks with blocking timed bulk transfers.
//!
//! Bulk endpoints are preferred during selection because the read primitive
//! here is a bulk transfer; isochronous endpoints are accepted as a
//! fallback for cameras that expose nothing else.

use std::ptr;
use std::time::Duration;

use crate::transport::{StreamEndpoint, TransferKind, Transport, TransportError};

/// libusb error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LibusbError {
    /// Operation completed
    Success = 0,
    /// Input/output error
    IoError = -1,
    /// Invalid parameter
    InvalidParam = -2,
    /// Access denied
    Access = -3,
    /// No such device
    NoDevice = -4,
    /// Entity not found
    NotFound = -5,
    /// Resource busy
    Busy = -6,
    /// Operation timed out
    Timeout = -7,
    /// Overflow
    Overflow = -8,
    /// Pipe error
    Pipe = -9,
    /// System call interrupted
    Interrupted = -10,
    /// Insufficient memory
    NoMem = -11,
    /// Operation not supported
    NotSupported = -12,
    /// Other error
    Other = -99,
}

impl From<i32> for LibusbError {
    fn from(code: i32) -> Self {
        match code {
            0 => LibusbError::Success,
            -1 => LibusbError::IoError,
            -2 => LibusbError::InvalidParam,
            -3 => LibusbError::Access,
            -4 => LibusbError::NoDevice,
            -5 => LibusbError::NotFound,
            -6 => LibusbError::Busy,
            -7 => LibusbError::Timeout,
            -8 => LibusbError::Overflow,
            -9 => LibusbError::Pipe,
            -10 => LibusbError::Interrupted,
            -11 => LibusbError::NoMem,
            -12 => LibusbError::NotSupported,
            _ => LibusbError::Other,
        }
    }
}

impl std::fmt::Display for LibusbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibusbError::Success => write!(f, "Success"),
            LibusbError::IoError => write!(f, "I/O error"),
            LibusbError::InvalidParam => write!(f, "Invalid parameter"),
            LibusbError::Access => write!(f, "Access denied"),
            LibusbError::NoDevice => write!(f, "No such device"),
            LibusbError::NotFound => write!(f, "Entity not found"),
            LibusbError::Busy => write!(f, "Resource busy"),
            LibusbError::Timeout => write!(f, "Operation timed out"),
            LibusbError::Overflow => write!(f, "Overflow"),
            LibusbError::Pipe => write!(f, "Pipe error"),
            LibusbError::Interrupted => write!(f, "System call interrupted"),
            LibusbError::NoMem => write!(f, "Insufficient memory"),
            LibusbError::NotSupported => write!(f, "Operation not supported"),
            LibusbError::Other => write!(f, "Other error"),
        }
    }
}

impl std::error::Error for LibusbError {}

impl From<LibusbError> for TransportError {
    fn from(e: LibusbError) -> Self {
        match e {
            LibusbError::Timeout => TransportError::Timeout,
            LibusbError::NoDevice => TransportError::Disconnected,
            other => TransportError::Io(other.to_string()),
        }
    }
}

/// USB video class code
const USB_CLASS_VIDEO: u8 = 0x0E;
/// Video streaming interface subclass
const USB_SUBCLASS_VIDEO_STREAMING: u8 = 0x02;
/// Direction bit for IN endpoints
const USB_ENDPOINT_IN: u8 = 0x80;

/// A [`Transport`] over a libusb device handle, addressed by VID/PID.
pub struct UsbTransport {
    vendor_id: u16,
    product_id: u16,
    ctx: *mut libusb1_sys::libusb_context,
    handle: *mut libusb1_sys::libusb_device_handle,
}

// SAFETY: the libusb context and device handle are thread-safe for
// synchronous transfers; the session serializes access behind a mutex.
unsafe impl Send for UsbTransport {}

impl UsbTransport {
    /// Address a device by vendor and product ID. Nothing is opened until
    /// [`Transport::open`].
    #[must_use]
    pub fn by_vid_pid(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            ctx: ptr::null_mut(),
            handle: ptr::null_mut(),
        }
    }

    fn init_context(&mut self) -> Result<(), TransportError> {
        if !self.ctx.is_null() {
            return Ok(());
        }
        unsafe {
            let mut ctx: *mut libusb1_sys::libusb_context = ptr::null_mut();
            let ret = libusb1_sys::libusb_init(&mut ctx);
            if ret < 0 {
                log::error!("libusb_init failed: {}", ret);
                return Err(TransportError::OpenFailed(
                    LibusbError::from(ret).to_string(),
                ));
            }
            self.ctx = ctx;
        }
        log::debug!("libusb context initialized");
        Ok(())
    }

    /// Walk the active configuration descriptor for a video streaming
    /// interface with a usable IN endpoint.
    fn find_streaming_endpoint(&self) -> Result<Option<StreamEndpoint>, LibusbError> {
        unsafe {
            let device = libusb1_sys::libusb_get_device(self.handle);
            let mut cfg_desc: *const libusb1_sys::libusb_config_descriptor = ptr::null();

            let ret = libusb1_sys::libusb_get_active_config_descriptor(device, &mut cfg_desc);
            if ret < 0 {
                log::error!("failed to get config descriptor: {}", ret);
                return Err(LibusbError::from(ret));
            }

            let cfg = &*cfg_desc;
            log::debug!("config descriptor: {} interfaces", cfg.bNumInterfaces);

            let mut selected: Option<StreamEndpoint> = None;

            for i in 0..cfg.bNumInterfaces as usize {
                let interface = &*cfg.interface.add(i);

                for j in 0..interface.num_altsetting as usize {
                    let altsetting = &*interface.altsetting.add(j);

                    let is_streaming = altsetting.bInterfaceClass == USB_CLASS_VIDEO
                        && altsetting.bInterfaceSubClass == USB_SUBCLASS_VIDEO_STREAMING;
                    if !is_streaming {
                        continue;
                    }

                    for k in 0..altsetting.bNumEndpoints as usize {
                        let ep = &*altsetting.endpoint.add(k);

                        if (ep.bEndpointAddress & USB_ENDPOINT_IN) == 0 {
                            continue;
                        }

                        let transfer_kind = match ep.bmAttributes & 0x03 {
                            1 => TransferKind::Isochronous,
                            2 => TransferKind::Bulk,
                            _ => continue,
                        };

                        // wMaxPacketSize bits 0-10 carry the packet size
                        let info = StreamEndpoint {
                            address: ep.bEndpointAddress,
                            interface_number: altsetting.bInterfaceNumber,
                            transfer_kind,
                            max_packet_size: ep.wMaxPacketSize & 0x7FF,
                        };
                        log::info!(
                            "streaming endpoint 0x{:02x} ({:?}) on interface {}.{}, maxPacket={}",
                            info.address,
                            info.transfer_kind,
                            altsetting.bInterfaceNumber,
                            altsetting.bAlternateSetting,
                            info.max_packet_size
                        );

                        // Bulk matches the blocking read primitive; take
                        // isochronous only when nothing else is offered
                        if selected.is_none()
                            || matches!(info.transfer_kind, TransferKind::Bulk)
                        {
                            selected = Some(info);
                        }
                    }
                }
            }

            libusb1_sys::libusb_free_config_descriptor(cfg_desc as *mut _);
            Ok(selected)
        }
    }

    /// Detach a kernel driver from the interface if one is attached.
    fn detach_kernel_driver(&self, interface_number: libc::c_int) {
        unsafe {
            let active = libusb1_sys::libusb_kernel_driver_active(self.handle, interface_number);
            if active == 1 {
                log::info!(
                    "kernel driver active on interface {}, detaching",
                    interface_number
                );
                let ret = libusb1_sys::libusb_detach_kernel_driver(self.handle, interface_number);
                if ret < 0 {
                    log::warn!("libusb_detach_kernel_driver failed: {}", ret);
                }
            } else if active < 0 && active != LibusbError::NotSupported as i32 {
                log::warn!("libusb_kernel_driver_active returned error: {}", active);
            }
        }
    }
}

impl Transport for UsbTransport {
    fn open(&mut self) -> Result<StreamEndpoint, TransportError> {
        self.init_context()?;

        unsafe {
            let handle = libusb1_sys::libusb_open_device_with_vid_pid(
                self.ctx,
                self.vendor_id,
                self.product_id,
            );
            if handle.is_null() {
                return Err(TransportError::OpenFailed(format!(
                    "no device {:04x}:{:04x}",
                    self.vendor_id, self.product_id
                )));
            }
            self.handle = handle;
        }
        log::info!(
            "opened device {:04x}:{:04x}",
            self.vendor_id,
            self.product_id
        );

        match self.find_streaming_endpoint() {
            Ok(Some(endpoint)) => Ok(endpoint),
            Ok(None) => Err(TransportError::EndpointNotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn claim_interface(&mut self, interface_number: u8) -> Result<(), TransportError> {
        if self.handle.is_null() {
            return Err(TransportError::ClaimRejected("device not open".into()));
        }

        let interface = libc::c_int::from(interface_number);
        self.detach_kernel_driver(interface);

        unsafe {
            let ret = libusb1_sys::libusb_claim_interface(self.handle, interface);
            if ret < 0 {
                return Err(TransportError::ClaimRejected(
                    LibusbError::from(ret).to_string(),
                ));
            }
        }
        log::info!("claimed interface {}", interface_number);
        Ok(())
    }

    fn read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if self.handle.is_null() {
            return Err(TransportError::Io("device not open".into()));
        }

        unsafe {
            let mut transferred: libc::c_int = 0;
            let ret = libusb1_sys::libusb_bulk_transfer(
                self.handle,
                endpoint,
                buf.as_mut_ptr(),
                buf.len() as libc::c_int,
                &mut transferred,
                timeout.as_millis() as u32,
            );

            if ret < 0 {
                return Err(LibusbError::from(ret).into());
            }
            Ok(transferred as usize)
        }
    }

    fn release_interface(&mut self, interface_number: u8) {
        if self.handle.is_null() {
            return;
        }
        unsafe {
            let ret = libusb1_sys::libusb_release_interface(
                self.handle,
                libc::c_int::from(interface_number),
            );
            if ret < 0 {
                log::warn!("libusb_release_interface failed: {}", ret);
            }
        }
    }

    fn close(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                libusb1_sys::libusb_close(self.handle);
            }
            self.handle = ptr::null_mut();
            log::debug!("device closed");
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
        if !self.ctx.is_null() {
            unsafe {
                libusb1_sys::libusb_exit(self.ctx);
            }
            self.ctx = ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_libusb_error_from_code() {
        assert_eq!(LibusbError::from(-7), LibusbError::Timeout);
        assert_eq!(LibusbError::from(-4), LibusbError::NoDevice);
        assert_eq!(LibusbError::from(-42), LibusbError::Other);
    }

    #[test]
    fn test_timeout_maps_to_transport_timeout() {
        assert_eq!(
            TransportError::from(LibusbError::Timeout),
            TransportError::Timeout
        );
        assert_eq!(
            TransportError::from(LibusbError::NoDevice),
            TransportError::Disconnected
        );
        assert!(matches!(
            TransportError::from(LibusbError::Pipe),
            TransportError::Io(_)
        ));
    }
}
