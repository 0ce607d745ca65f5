//! Direct3D 11 render targets, shared through DXGI handles.

use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_UNKNOWN};
use windows::Win32::Graphics::Direct3D11::{
	D3D11_BIND_RENDER_TARGET, D3D11_BIND_SHADER_RESOURCE, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
	D3D11_RESOURCE_MISC_SHARED, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT, D3D11CreateDevice,
	ID3D11Device, ID3D11DeviceContext, ID3D11Multithread, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{IDXGIAdapter, IDXGIResource};
use windows::core::Interface;

use super::{ExternalHandle, Gpu};
use crate::{Error, RenderApi, Result};

/// A device owned by one player, created when the player is.
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
	device: ID3D11Device,
	context: ID3D11DeviceContext,
}

// SAFETY: the device is free-threaded and the immediate context is multithread protected.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[derive(Clone, Debug)]
pub struct Texture {
	texture: ID3D11Texture2D,
}

// SAFETY: only used under the owning device's multithread protection.
unsafe impl Send for Texture {}
unsafe impl Sync for Texture {}

/// Render targets on a D3D11 device, shared with the compositor's device by handle.
#[derive(Default)]
pub struct D3d11 {
	adapter: Option<IDXGIAdapter>,
}

// SAFETY: the adapter is only used to create devices.
unsafe impl Send for D3d11 {}
unsafe impl Sync for D3d11 {}

impl D3d11 {
	/// Create devices on the compositor's adapter, so the shared handle can be opened there.
	pub fn new(adapter: Option<IDXGIAdapter>) -> Self {
		Self { adapter }
	}
}

impl Gpu for D3d11 {
	type Context = Device;
	type Target = Texture;

	fn create_device(&self) -> Result<Option<Device>> {
		let driver = match self.adapter {
			Some(_) => D3D_DRIVER_TYPE_UNKNOWN,
			None => D3D_DRIVER_TYPE_HARDWARE,
		};

		let mut device: Option<ID3D11Device> = None;
		let mut context: Option<ID3D11DeviceContext> = None;

		// SAFETY: out parameters are valid for the duration of the call.
		unsafe {
			D3D11CreateDevice(
				self.adapter.as_ref(),
				driver,
				HMODULE::default(),
				D3D11_CREATE_DEVICE_BGRA_SUPPORT,
				None,
				D3D11_SDK_VERSION,
				Some(&mut device),
				None,
				Some(&mut context),
			)
		}
		.map_err(|err| {
			tracing::error!(%err, "failed to create d3d11 device");
			Error::Device(err.code().0)
		})?;

		let (Some(device), Some(context)) = (device, context) else {
			return Err(Error::Device(-1));
		};

		// The decoder renders from its own threads.
		if let Ok(mt) = device.cast::<ID3D11Multithread>() {
			// SAFETY: plain setter on a live interface.
			let _ = unsafe { mt.SetMultithreadProtected(true) };
		}

		Ok(Some(Device { device, context }))
	}

	fn create_target(&self, device: &Device, width: u32, height: u32) -> Result<Texture> {
		let desc = D3D11_TEXTURE2D_DESC {
			Width: width,
			Height: height,
			MipLevels: 1,
			ArraySize: 1,
			Format: DXGI_FORMAT_B8G8R8A8_UNORM,
			SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
			Usage: D3D11_USAGE_DEFAULT,
			BindFlags: (D3D11_BIND_RENDER_TARGET.0 | D3D11_BIND_SHADER_RESOURCE.0) as u32,
			CPUAccessFlags: 0,
			MiscFlags: D3D11_RESOURCE_MISC_SHARED.0 as u32,
		};

		let mut texture: Option<ID3D11Texture2D> = None;

		// SAFETY: the descriptor and out parameter are valid for the duration of the call.
		unsafe { device.device.CreateTexture2D(&desc, None, Some(&mut texture)) }.map_err(|err| {
			tracing::warn!(%err, width, height, "failed to create shared texture");
			Error::Device(err.code().0)
		})?;

		let texture = texture.ok_or(Error::Device(-1))?;
		Ok(Texture { texture })
	}

	fn render_api(&self, target: &Texture) -> RenderApi {
		RenderApi::D3d11 {
			rtv: target.texture.as_raw() as usize,
		}
	}

	fn share(&self, _device: &Device, target: &Texture) -> Result<ExternalHandle> {
		let resource: IDXGIResource = target.texture.cast().map_err(|_| Error::Image)?;

		// SAFETY: the resource was created with D3D11_RESOURCE_MISC_SHARED.
		let handle = unsafe { resource.GetSharedHandle() }.map_err(|err| {
			tracing::warn!(%err, "failed to get shared handle");
			Error::Image
		})?;

		Ok(ExternalHandle::DxgiShared(handle.0 as usize))
	}

	fn release(&self, device: &Device, target: Texture, _shared: Option<ExternalHandle>) {
		// Legacy shared handles are not closed; dropping the last reference frees the texture.
		drop(target);

		// SAFETY: flushes pending work on the protected immediate context.
		unsafe { device.context.Flush() };
	}

	fn make_current(&self, _device: &Device) -> Result<Option<Device>> {
		// D3D11 has no thread-current device.
		Ok(None)
	}

	fn restore(&self, _previous: Option<Device>) {}
}
